// src/triggers/trigger_map.rs

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::{debug, trace};

use crate::triggers::blob_path::BlobPath;
use crate::triggers::causality::BlobWriteLog;
use crate::triggers::model::{BlobTrigger, FunctionDefinition, Trigger};

/// Index from trigger sources to the functions they fire.
///
/// Built once from the function definitions; only [`reindex`](Self::reindex)
/// changes it afterwards.
#[derive(Debug, Clone, Default)]
pub struct TriggerMap {
    triggers: BTreeMap<String, Vec<Trigger>>,
    by_queue: HashMap<String, Vec<String>>,
    by_container: HashMap<String, Vec<(String, BlobTrigger)>>,
    timers: Vec<(String, Duration)>,
}

impl TriggerMap {
    pub fn build(functions: &[FunctionDefinition]) -> Self {
        let mut map = Self::default();
        map.reindex(functions);
        map
    }

    /// Replace the whole index with one built from `functions`.
    pub fn reindex(&mut self, functions: &[FunctionDefinition]) {
        self.triggers.clear();
        self.by_queue.clear();
        self.by_container.clear();
        self.timers.clear();

        for function in functions {
            let id = function.id();
            for trigger in &function.triggers {
                match trigger {
                    Trigger::Queue(q) => self
                        .by_queue
                        .entry(q.queue_name.clone())
                        .or_default()
                        .push(id.clone()),
                    Trigger::Blob(b) => self
                        .by_container
                        .entry(b.input.container().to_ascii_lowercase())
                        .or_default()
                        .push((id.clone(), b.clone())),
                    Trigger::Timer(t) => self.timers.push((id.clone(), t.interval)),
                }
            }
            self.triggers.insert(id, function.triggers.clone());
        }

        debug!(
            functions = self.triggers.len(),
            queues = self.by_queue.len(),
            containers = self.by_container.len(),
            timers = self.timers.len(),
            "trigger map indexed"
        );
    }

    pub fn triggers_for(&self, function_id: &str) -> &[Trigger] {
        self.triggers.get(function_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions_for_queue(&self, queue: &str) -> &[String] {
        self.by_queue.get(queue).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blob triggers whose input container matches `path`'s container.
    ///
    /// The blob part still has to be matched against each input pattern.
    pub fn blob_triggers_for(&self, path: &BlobPath) -> &[(String, BlobTrigger)] {
        self.by_container
            .get(&path.container.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn timers(&self) -> &[(String, Duration)] {
        &self.timers
    }

    /// Queue names with at least one listening function, sorted.
    pub fn queue_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_queue.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn function_ids(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }
}

/// Whether a blob trigger should fire for a write of `input`.
///
/// Triggers without declared outputs always fire. Otherwise the trigger
/// fires when some output is missing or was written before the input.
pub fn should_invoke_blob_trigger(
    trigger: &BlobTrigger,
    input: &BlobPath,
    captures: &BTreeMap<String, String>,
    log: &BlobWriteLog,
) -> bool {
    if trigger.outputs.is_empty() {
        return true;
    }
    let Some(input_written) = log.last_write(input) else {
        return true;
    };

    for output in &trigger.outputs {
        let Ok(path) = output.apply_names(captures) else {
            return true;
        };
        match log.last_write(&path) {
            Some(written) if written > input_written => {
                trace!(input = %input, output = %path, "output is newer than input");
            }
            _ => return true,
        }
    }
    debug!(input = %input, "all outputs up to date; skipping blob trigger");
    false
}
