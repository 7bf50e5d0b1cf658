// src/engine/listeners.rs

//! [`TriggerExecutor`]s that forward leased messages to the worker.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::engine::TriggerEvent;
use crate::errors::{HostError, Result};
use crate::listener::poll_queue::TriggerExecutor;
use crate::storage::queue::QueueMessage;
use crate::triggers::causality::BlobWrittenMessage;

/// Forwards messages of a function queue and reports the worker's ack.
#[derive(Debug, Clone)]
pub struct QueueTriggerExecutor {
    queue: String,
    tx: mpsc::Sender<TriggerEvent>,
}

impl QueueTriggerExecutor {
    pub fn new(queue: impl Into<String>, tx: mpsc::Sender<TriggerEvent>) -> Self {
        Self {
            queue: queue.into(),
            tx,
        }
    }
}

impl TriggerExecutor for QueueTriggerExecutor {
    async fn execute(&self, message: &QueueMessage) -> Result<bool> {
        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(TriggerEvent::QueueMessage {
                queue: self.queue.clone(),
                message: message.clone(),
                ack,
            })
            .await
            .map_err(|_| worker_gone())?;
        Ok(ack_rx.await.unwrap_or(false))
    }
}

/// Decodes blob-written notifications and forwards them to the worker.
#[derive(Debug, Clone)]
pub struct BlobNotificationExecutor {
    tx: mpsc::Sender<TriggerEvent>,
}

impl BlobNotificationExecutor {
    pub fn new(tx: mpsc::Sender<TriggerEvent>) -> Self {
        Self { tx }
    }
}

impl TriggerExecutor for BlobNotificationExecutor {
    async fn execute(&self, message: &QueueMessage) -> Result<bool> {
        let notice = BlobWrittenMessage::from_json(&message.payload)?;
        debug!(blob = %notice.path(), "blob notification received");

        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(TriggerEvent::BlobWritten {
                notice,
                ack: Some(ack),
            })
            .await
            .map_err(|_| worker_gone())?;
        Ok(ack_rx.await.unwrap_or(false))
    }
}

fn worker_gone() -> HostError {
    HostError::InvalidOperation("worker stopped accepting trigger events".to_string())
}
