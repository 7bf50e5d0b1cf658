// src/storage/queue.rs

use std::future::Future;
use std::time::Duration;

use crate::errors::StorageResult;

/// Proof of exclusive, time-bounded ownership of one dequeued message.
///
/// The pop receipt changes on every dequeue and every visibility update, so
/// a holder of a stale lease gets [`crate::errors::StorageError::LeaseLost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub message_id: String,
    pub pop_receipt: String,
}

/// A leased queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub payload: String,
    /// How many times this message has been handed out, including this one.
    pub dequeue_count: u32,
    pub lease: Lease,
}

/// Lease-based queue transport.
pub trait QueueTransport: Send + Sync {
    fn name(&self) -> &str;

    fn exists(&self) -> impl Future<Output = StorageResult<bool>> + Send;

    fn create_if_not_exists(&self) -> impl Future<Output = StorageResult<()>> + Send;

    /// Enqueue `payload`; returns the new message id.
    fn add_message(&self, payload: String) -> impl Future<Output = StorageResult<String>> + Send;

    /// Lease the next visible message, hiding it for `visibility_timeout`.
    fn get_message(
        &self,
        visibility_timeout: Duration,
    ) -> impl Future<Output = StorageResult<Option<QueueMessage>>> + Send;

    /// Extend a lease; returns the renewed lease to use from now on.
    fn update_message_visibility(
        &self,
        lease: &Lease,
        visibility_timeout: Duration,
    ) -> impl Future<Output = StorageResult<Lease>> + Send;

    fn delete_message(&self, lease: &Lease) -> impl Future<Output = StorageResult<()>> + Send;
}

/// Factory for named queues.
pub trait QueueService: Send + Sync {
    type Queue: QueueTransport + Clone + 'static;

    fn queue(&self, name: &str) -> Self::Queue;
}
