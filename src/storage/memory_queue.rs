// src/storage/memory_queue.rs

//! In-memory [`QueueTransport`] with visibility timeouts.
//!
//! Time is read from `tokio::time::Instant`, so tests running with a paused
//! clock can drive lease expiry deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{StorageError, StorageResult};
use crate::storage::queue::{Lease, QueueMessage, QueueService, QueueTransport};

#[derive(Debug)]
struct StoredMessage {
    id: String,
    payload: String,
    visible_at: Instant,
    dequeue_count: u32,
    pop_receipt: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    exists: bool,
    messages: VecDeque<StoredMessage>,
    injected_failures: VecDeque<StorageError>,
    injected_delete_failures: VecDeque<StorageError>,
}

/// Cloneable handle to a shared in-memory queue.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: String,
    state: Arc<Mutex<QueueState>>,
}

impl MemoryQueue {
    /// A queue that already exists.
    pub fn new(name: impl Into<String>) -> Self {
        let queue = Self::missing(name);
        queue.lock().exists = true;
        queue
    }

    /// A handle to a queue that has not been created yet.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    /// Number of stored messages, visible or leased.
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `get_message` calls fail with the given errors, in order.
    pub fn inject_get_failure(&self, err: StorageError) {
        self.lock().injected_failures.push_back(err);
    }

    /// Make the next `delete_message` calls fail with the given errors, in
    /// order. The message stays stored under its current lease.
    pub fn inject_delete_failure(&self, err: StorageError) {
        self.lock().injected_delete_failures.push_back(err);
    }

    /// Payloads of all stored messages, in queue order.
    pub fn payloads(&self) -> Vec<String> {
        self.lock().messages.iter().map(|m| m.payload.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn missing_error(&self) -> StorageError {
        StorageError::NotFound(format!("queue '{}'", self.name))
    }
}

impl QueueTransport for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> StorageResult<bool> {
        Ok(self.lock().exists)
    }

    async fn create_if_not_exists(&self) -> StorageResult<()> {
        self.lock().exists = true;
        Ok(())
    }

    async fn add_message(&self, payload: String) -> StorageResult<String> {
        let mut state = self.lock();
        if !state.exists {
            return Err(self.missing_error());
        }
        let id = Uuid::new_v4().to_string();
        state.messages.push_back(StoredMessage {
            id: id.clone(),
            payload,
            visible_at: Instant::now(),
            dequeue_count: 0,
            pop_receipt: None,
        });
        trace!(queue = %self.name, message = %id, "message added");
        Ok(id)
    }

    async fn get_message(&self, visibility_timeout: Duration) -> StorageResult<Option<QueueMessage>> {
        let mut state = self.lock();
        if let Some(err) = state.injected_failures.pop_front() {
            return Err(err);
        }
        if !state.exists {
            return Err(self.missing_error());
        }

        let now = Instant::now();
        let Some(stored) = state.messages.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        let receipt = Uuid::new_v4().to_string();
        stored.visible_at = now + visibility_timeout;
        stored.dequeue_count += 1;
        stored.pop_receipt = Some(receipt.clone());

        Ok(Some(QueueMessage {
            id: stored.id.clone(),
            payload: stored.payload.clone(),
            dequeue_count: stored.dequeue_count,
            lease: Lease {
                message_id: stored.id.clone(),
                pop_receipt: receipt,
            },
        }))
    }

    async fn update_message_visibility(
        &self,
        lease: &Lease,
        visibility_timeout: Duration,
    ) -> StorageResult<Lease> {
        let mut state = self.lock();
        let stored = state
            .messages
            .iter_mut()
            .find(|m| m.id == lease.message_id)
            .ok_or_else(|| StorageError::NotFound(format!("message {}", lease.message_id)))?;

        if stored.pop_receipt.as_deref() != Some(lease.pop_receipt.as_str()) {
            return Err(StorageError::LeaseLost(lease.message_id.clone()));
        }

        let receipt = Uuid::new_v4().to_string();
        stored.visible_at = Instant::now() + visibility_timeout;
        stored.pop_receipt = Some(receipt.clone());

        Ok(Lease {
            message_id: lease.message_id.clone(),
            pop_receipt: receipt,
        })
    }

    async fn delete_message(&self, lease: &Lease) -> StorageResult<()> {
        let mut state = self.lock();
        if let Some(err) = state.injected_delete_failures.pop_front() {
            return Err(err);
        }
        let idx = state
            .messages
            .iter()
            .position(|m| m.id == lease.message_id)
            .ok_or_else(|| StorageError::NotFound(format!("message {}", lease.message_id)))?;

        if state.messages[idx].pop_receipt.as_deref() != Some(lease.pop_receipt.as_str()) {
            return Err(StorageError::LeaseLost(lease.message_id.clone()));
        }
        state.messages.remove(idx);
        Ok(())
    }
}

/// Hands out shared [`MemoryQueue`]s by name. Queues start out missing until
/// `create_if_not_exists` is called on one of the handles.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueService {
    queues: Arc<Mutex<HashMap<String, MemoryQueue>>>,
}

impl MemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueService for MemoryQueueService {
    type Queue = MemoryQueue;

    fn queue(&self, name: &str) -> MemoryQueue {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(name.to_string())
            .or_insert_with(|| MemoryQueue::missing(name))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn leased_message_is_hidden_until_visibility_expires() {
        let queue = MemoryQueue::new("q");
        queue.add_message("hello".into()).await.unwrap();

        let first = queue.get_message(TIMEOUT).await.unwrap().unwrap();
        assert_eq!(first.dequeue_count, 1);
        assert!(queue.get_message(TIMEOUT).await.unwrap().is_none());

        tokio::time::advance(TIMEOUT + Duration::from_millis(1)).await;
        let second = queue.get_message(TIMEOUT).await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.dequeue_count, 2);

        // The first holder's lease is stale now.
        let err = queue.delete_message(&first.lease).await.unwrap_err();
        assert_eq!(err, StorageError::LeaseLost(first.id.clone()));
        queue.delete_message(&second.lease).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_update_issues_new_receipt() {
        let queue = MemoryQueue::new("q");
        queue.add_message("x".into()).await.unwrap();
        let msg = queue.get_message(TIMEOUT).await.unwrap().unwrap();

        let renewed = queue.update_message_visibility(&msg.lease, TIMEOUT).await.unwrap();
        assert_ne!(renewed.pop_receipt, msg.lease.pop_receipt);
        assert!(queue.delete_message(&msg.lease).await.is_err());
        queue.delete_message(&renewed).await.unwrap();
    }

    #[tokio::test]
    async fn missing_queue_reports_not_found() {
        let queue = MemoryQueue::missing("q");
        assert!(!queue.exists().await.unwrap());
        assert!(matches!(
            queue.add_message("x".into()).await,
            Err(StorageError::NotFound(_))
        ));
        queue.create_if_not_exists().await.unwrap();
        assert!(queue.add_message("x".into()).await.is_ok());
    }
}
