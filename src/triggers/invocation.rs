// src/triggers/invocation.rs

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::storage::queue::QueueMessage;
use crate::triggers::blob_path::BlobPath;
use crate::triggers::causality::{PARENT_ID_PROPERTY, owner_from_payload};
use crate::triggers::model::{BlobTrigger, FunctionDefinition, FunctionLocation};
use crate::types::InvocationId;

/// Why an invocation was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    Timer,
    QueueMessage {
        message_id: String,
        parent: Option<InvocationId>,
    },
    Blob {
        blob_path: BlobPath,
        parent: Option<InvocationId>,
    },
    Invoke {
        parent: Option<InvocationId>,
    },
}

impl TriggerReason {
    /// Invocation that caused this one, if known.
    pub fn parent(&self) -> Option<InvocationId> {
        match self {
            TriggerReason::Timer => None,
            TriggerReason::QueueMessage { parent, .. }
            | TriggerReason::Blob { parent, .. }
            | TriggerReason::Invoke { parent } => *parent,
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Timer => f.write_str("timer"),
            TriggerReason::QueueMessage { message_id, .. } => write!(f, "queue message {message_id}"),
            TriggerReason::Blob { blob_path, .. } => write!(f, "blob {blob_path}"),
            TriggerReason::Invoke { .. } => f.write_str("explicit call"),
        }
    }
}

/// A request to run one function once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub id: InvocationId,
    pub location: FunctionLocation,
    pub args: BTreeMap<String, String>,
    /// Invocations that must complete successfully before this one runs.
    pub prereqs: Vec<InvocationId>,
    pub trigger_reason: TriggerReason,
}

impl InvocationRequest {
    pub fn with_prereqs(mut self, prereqs: Vec<InvocationId>) -> Self {
        self.prereqs = prereqs;
        self
    }
}

/// What a trigger hands to the binder.
#[derive(Debug, Clone, Copy)]
pub enum BindingSource<'a> {
    Timer,
    QueueMessage(&'a str),
    Blob(&'a BlobPath),
    Invoke,
}

/// Turns trigger data plus route names into invocation arguments.
pub trait ParameterBinder: Send + Sync {
    fn bind(
        &self,
        source: BindingSource<'_>,
        names: BTreeMap<String, String>,
    ) -> BTreeMap<String, String>;
}

/// Name-parameter substitution.
///
/// - queue messages are bound as `message`; scalar top-level properties of a
///   JSON object payload become name parameters as well;
/// - blobs are bound as `blob` (the full `container/blob` path);
/// - explicitly supplied names always win.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameParameterBinder;

impl ParameterBinder for NameParameterBinder {
    fn bind(
        &self,
        source: BindingSource<'_>,
        mut names: BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        match source {
            BindingSource::Timer | BindingSource::Invoke => {}
            BindingSource::QueueMessage(payload) => {
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payload) {
                    for (key, value) in map {
                        if key == PARENT_ID_PROPERTY {
                            continue;
                        }
                        let text = match value {
                            Value::String(s) => s,
                            Value::Number(n) => n.to_string(),
                            Value::Bool(b) => b.to_string(),
                            _ => continue,
                        };
                        names.entry(key).or_insert(text);
                    }
                }
                names
                    .entry("message".to_string())
                    .or_insert_with(|| payload.to_string());
            }
            BindingSource::Blob(path) => {
                names
                    .entry("blob".to_string())
                    .or_insert_with(|| path.to_string());
            }
        }
        names
    }
}

/// Builds [`InvocationRequest`]s for each kind of trigger.
#[derive(Debug, Clone, Default)]
pub struct InvocationBuilder<B = NameParameterBinder> {
    binder: B,
}

impl<B: ParameterBinder> InvocationBuilder<B> {
    pub fn new(binder: B) -> Self {
        Self { binder }
    }

    pub fn for_timer(&self, function: &FunctionDefinition) -> InvocationRequest {
        self.request(
            function,
            self.binder.bind(BindingSource::Timer, BTreeMap::new()),
            TriggerReason::Timer,
        )
    }

    pub fn for_queue_message(
        &self,
        function: &FunctionDefinition,
        message: &QueueMessage,
    ) -> InvocationRequest {
        let parent = owner_from_payload(&message.payload);
        let args = self
            .binder
            .bind(BindingSource::QueueMessage(&message.payload), BTreeMap::new());
        self.request(
            function,
            args,
            TriggerReason::QueueMessage {
                message_id: message.id.clone(),
                parent,
            },
        )
    }

    /// Returns `None` when `path` does not match the trigger's input pattern.
    pub fn for_blob(
        &self,
        function: &FunctionDefinition,
        trigger: &BlobTrigger,
        path: &BlobPath,
        writer: Option<InvocationId>,
    ) -> Option<InvocationRequest> {
        let Some(captures) = trigger.input.match_path(path) else {
            trace!(function = %function.location, blob = %path, "blob does not match input pattern");
            return None;
        };
        let args = self.binder.bind(BindingSource::Blob(path), captures);
        Some(self.request(
            function,
            args,
            TriggerReason::Blob {
                blob_path: path.clone(),
                parent: writer,
            },
        ))
    }

    /// Explicit call with caller-supplied arguments and prerequisites.
    pub fn for_call(
        &self,
        function: &FunctionDefinition,
        args: BTreeMap<String, String>,
        prereqs: Vec<InvocationId>,
        parent: Option<InvocationId>,
    ) -> InvocationRequest {
        let args = self.binder.bind(BindingSource::Invoke, args);
        self.request(function, args, TriggerReason::Invoke { parent })
            .with_prereqs(prereqs)
    }

    fn request(
        &self,
        function: &FunctionDefinition,
        args: BTreeMap<String, String>,
        trigger_reason: TriggerReason,
    ) -> InvocationRequest {
        InvocationRequest {
            id: InvocationId::new(),
            location: function.location.clone(),
            args,
            prereqs: Vec::new(),
            trigger_reason,
        }
    }
}
