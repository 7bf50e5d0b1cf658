// src/engine/mod.rs

//! Orchestration engine for jobhost.
//!
//! Listeners and timers send [`TriggerEvent`]s over a channel. The pure
//! [`WorkerCore`] turns each event into invocation requests, and the async
//! [`Worker`] shell hands those to an [`ExecutionQueue`](crate::exec::ExecutionQueue)
//! and acknowledges the event.

use tokio::sync::oneshot;

use crate::storage::queue::QueueMessage;
use crate::triggers::causality::BlobWrittenMessage;

/// Events flowing into the worker from listeners, timers and signals.
#[derive(Debug)]
pub enum TriggerEvent {
    /// A timer-triggered function is due.
    Timer { function_id: String },
    /// A message was leased from `queue`. `ack` receives `true` once every
    /// resulting invocation was queued, which lets the listener delete it.
    QueueMessage {
        queue: String,
        message: QueueMessage,
        ack: oneshot::Sender<bool>,
    },
    /// A blob was written.
    BlobWritten {
        notice: BlobWrittenMessage,
        ack: Option<oneshot::Sender<bool>>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Capacity of the trigger event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub mod core;
pub mod event_handlers;
pub mod listeners;
pub mod runtime;
pub mod timers;

pub use core::{CoreEvent, WorkerCore};
pub use event_handlers::CoreStep;
pub use listeners::{BlobNotificationExecutor, QueueTriggerExecutor};
pub use runtime::{Worker, WorkerHeartbeat};
pub use timers::spawn_timer_trigger;
