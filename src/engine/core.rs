// src/engine/core.rs

//! Pure core state machine of the worker.
//!
//! [`WorkerCore`] consumes [`CoreEvent`]s and produces a [`CoreStep`]: the
//! invocation requests to queue and whether the event was accepted. It has
//! no channels and performs no IO, so it is unit tested directly.

use std::collections::HashMap;

use crate::engine::event_handlers::{
    CoreStep, handle_blob_written, handle_queue_message, handle_timer,
};
use crate::storage::queue::QueueMessage;
use crate::triggers::causality::{BlobWriteLog, BlobWrittenMessage};
use crate::triggers::invocation::{InvocationBuilder, NameParameterBinder, ParameterBinder};
use crate::triggers::model::FunctionDefinition;
use crate::triggers::trigger_map::TriggerMap;

/// Trigger events with the reply channels stripped off.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    Timer { function_id: String },
    QueueMessage { queue: String, message: QueueMessage },
    BlobWritten(BlobWrittenMessage),
    ShutdownRequested,
}

#[derive(Debug)]
pub struct WorkerCore<B = NameParameterBinder> {
    functions: HashMap<String, FunctionDefinition>,
    map: TriggerMap,
    builder: InvocationBuilder<B>,
    blob_log: BlobWriteLog,
}

impl WorkerCore<NameParameterBinder> {
    pub fn new(functions: Vec<FunctionDefinition>) -> Self {
        Self::with_binder(functions, NameParameterBinder)
    }
}

impl<B: ParameterBinder> WorkerCore<B> {
    pub fn with_binder(functions: Vec<FunctionDefinition>, binder: B) -> Self {
        let map = TriggerMap::build(&functions);
        let functions = functions.into_iter().map(|f| (f.id(), f)).collect();
        Self {
            functions,
            map,
            builder: InvocationBuilder::new(binder),
            blob_log: BlobWriteLog::new(),
        }
    }

    pub fn trigger_map(&self) -> &TriggerMap {
        &self.map
    }

    pub fn blob_log(&self) -> &BlobWriteLog {
        &self.blob_log
    }

    /// Handle a single event.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::Timer { function_id } => {
                handle_timer(&self.functions, &self.builder, &function_id)
            }
            CoreEvent::QueueMessage { queue, message } => handle_queue_message(
                &self.functions,
                &self.map,
                &self.builder,
                &queue,
                &message,
            ),
            CoreEvent::BlobWritten(notice) => handle_blob_written(
                &self.functions,
                &self.map,
                &self.builder,
                &mut self.blob_log,
                &notice,
            ),
            CoreEvent::ShutdownRequested => CoreStep::shutdown(),
        }
    }
}
