// src/engine/runtime.rs

use std::fmt;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutionQueue;
use crate::triggers::invocation::{InvocationRequest, NameParameterBinder, ParameterBinder};

use super::core::{CoreEvent, WorkerCore};
use super::TriggerEvent;

/// Liveness snapshot published by a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHeartbeat {
    /// When the worker was created and its trigger map built.
    pub started_at: Instant,
    /// When the last event finished processing.
    pub last_event_at: Option<Instant>,
    pub events_handled: u64,
    /// Invocation requests handed to the execution queue.
    pub invocations_queued: u64,
}

impl WorkerHeartbeat {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            last_event_at: None,
            events_handled: 0,
            invocations_queued: 0,
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Async shell around [`WorkerCore`].
///
/// Reads [`TriggerEvent`]s, feeds them to the core, queues the resulting
/// requests and answers the event's ack channel.
pub struct Worker<X, B = NameParameterBinder> {
    core: WorkerCore<B>,
    event_rx: mpsc::Receiver<TriggerEvent>,
    queue: X,
    heartbeat: watch::Sender<WorkerHeartbeat>,
}

impl<X, B: fmt::Debug> fmt::Debug for Worker<X, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<X: ExecutionQueue, B: ParameterBinder> Worker<X, B> {
    pub fn new(core: WorkerCore<B>, event_rx: mpsc::Receiver<TriggerEvent>, queue: X) -> Self {
        let (heartbeat, _) = watch::channel(WorkerHeartbeat::new());
        Self {
            core,
            event_rx,
            queue,
            heartbeat,
        }
    }

    /// Subscribe to heartbeat updates. The receiver keeps the last snapshot
    /// after the worker exits.
    pub fn heartbeat(&self) -> watch::Receiver<WorkerHeartbeat> {
        self.heartbeat.subscribe()
    }

    /// Main event loop. Returns when shutdown is requested or every sender
    /// is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("jobhost worker started");

        while let Some(event) = self.event_rx.recv().await {
            let (event, ack) = split_event(event);
            debug!(?event, "worker received event");

            let step = self.core.step(event);
            let mut accepted = step.accepted;
            let mut queued = 0;
            for request in step.requests {
                if self.enqueue(request).await {
                    queued += 1;
                } else {
                    accepted = false;
                }
            }
            self.heartbeat.send_modify(|beat| {
                beat.last_event_at = Some(Instant::now());
                beat.events_handled += 1;
                beat.invocations_queued += queued;
            });

            if let Some(ack) = ack {
                // The listener may have given up waiting.
                let _ = ack.send(accepted);
            }

            if !step.keep_running {
                info!("shutdown requested; stopping worker");
                break;
            }
        }

        let beat = *self.heartbeat.borrow();
        info!(
            events = beat.events_handled,
            queued = beat.invocations_queued,
            uptime = ?beat.uptime(),
            "worker exiting"
        );
        Ok(())
    }

    async fn enqueue(&self, request: InvocationRequest) -> bool {
        let id = request.id;
        let function = request.location.id();
        debug!(invocation = %id, %function, reason = %request.trigger_reason, "queueing invocation");
        match self.queue.enqueue(request).await {
            Ok(()) => true,
            Err(e) => {
                warn!(invocation = %id, %function, error = %e, "failed to queue invocation");
                false
            }
        }
    }
}

fn split_event(event: TriggerEvent) -> (CoreEvent, Option<oneshot::Sender<bool>>) {
    match event {
        TriggerEvent::Timer { function_id } => (CoreEvent::Timer { function_id }, None),
        TriggerEvent::QueueMessage {
            queue,
            message,
            ack,
        } => (CoreEvent::QueueMessage { queue, message }, Some(ack)),
        TriggerEvent::BlobWritten { notice, ack } => (CoreEvent::BlobWritten(notice), ack),
        TriggerEvent::ShutdownRequested => (CoreEvent::ShutdownRequested, None),
    }
}
