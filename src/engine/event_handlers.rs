// src/engine/event_handlers.rs

//! Event handling logic for the worker core.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::storage::queue::QueueMessage;
use crate::triggers::causality::{BlobWriteLog, BlobWrittenMessage};
use crate::triggers::invocation::{InvocationBuilder, InvocationRequest, ParameterBinder};
use crate::triggers::model::FunctionDefinition;
use crate::triggers::trigger_map::{TriggerMap, should_invoke_blob_trigger};

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Requests the shell should hand to the execution queue.
    pub requests: Vec<InvocationRequest>,
    /// False when the event could not be routed, so it must not be acked.
    pub accepted: bool,
    /// Whether the outer loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn accepted(requests: Vec<InvocationRequest>) -> Self {
        Self {
            requests,
            accepted: true,
            keep_running: true,
        }
    }

    pub(crate) fn rejected() -> Self {
        Self {
            requests: Vec::new(),
            accepted: false,
            keep_running: true,
        }
    }

    pub(crate) fn shutdown() -> Self {
        Self {
            requests: Vec::new(),
            accepted: true,
            keep_running: false,
        }
    }
}

pub fn handle_timer<B: ParameterBinder>(
    functions: &HashMap<String, FunctionDefinition>,
    builder: &InvocationBuilder<B>,
    function_id: &str,
) -> CoreStep {
    match functions.get(function_id) {
        Some(function) => CoreStep::accepted(vec![builder.for_timer(function)]),
        None => {
            warn!(function = %function_id, "timer fired for unknown function");
            CoreStep::rejected()
        }
    }
}

/// One request per function listening on `queue`.
///
/// A message on a queue nobody listens to is not accepted, so it stays on
/// the queue (and eventually reaches the poison queue).
pub fn handle_queue_message<B: ParameterBinder>(
    functions: &HashMap<String, FunctionDefinition>,
    map: &TriggerMap,
    builder: &InvocationBuilder<B>,
    queue: &str,
    message: &QueueMessage,
) -> CoreStep {
    let listeners = map.functions_for_queue(queue);
    if listeners.is_empty() {
        warn!(%queue, message = %message.id, "no function listens on queue");
        return CoreStep::rejected();
    }

    let requests = listeners
        .iter()
        .filter_map(|id| functions.get(id))
        .map(|function| builder.for_queue_message(function, message))
        .collect();
    CoreStep::accepted(requests)
}

/// Record the write, then build a request for every blob trigger whose
/// input matches and whose outputs are stale.
///
/// A redelivered notice does not count as a new write, so it fires nothing
/// once the outputs have been written.
pub fn handle_blob_written<B: ParameterBinder>(
    functions: &HashMap<String, FunctionDefinition>,
    map: &TriggerMap,
    builder: &InvocationBuilder<B>,
    log: &mut BlobWriteLog,
    notice: &BlobWrittenMessage,
) -> CoreStep {
    let path = notice.path();
    log.record_notice(notice);

    let mut requests = Vec::new();
    for (function_id, trigger) in map.blob_triggers_for(&path) {
        let Some(function) = functions.get(function_id) else {
            continue;
        };
        let Some(captures) = trigger.input.match_path(&path) else {
            continue;
        };
        if !should_invoke_blob_trigger(trigger, &path, &captures, log) {
            continue;
        }
        if let Some(request) = builder.for_blob(function, trigger, &path, notice.writer) {
            requests.push(request);
        }
    }

    debug!(blob = %path, invocations = requests.len(), "blob write handled");
    CoreStep::accepted(requests)
}
