// src/listener/visibility.rs

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::listener::interval::CanFailCommand;
use crate::storage::queue::{Lease, QueueTransport};

/// Pushes a leased message's visibility timeout forward.
///
/// The lease is shared with the owner of the message: every successful
/// renewal stores the new pop receipt there, so the final delete uses the
/// current one.
#[derive(Debug)]
pub struct UpdateQueueMessageVisibilityCommand<Q> {
    queue: Q,
    lease: Arc<Mutex<Lease>>,
    visibility_timeout: Duration,
}

impl<Q: QueueTransport> UpdateQueueMessageVisibilityCommand<Q> {
    pub fn new(queue: Q, lease: Arc<Mutex<Lease>>, visibility_timeout: Duration) -> Self {
        Self {
            queue,
            lease,
            visibility_timeout,
        }
    }
}

impl<Q: QueueTransport> CanFailCommand for UpdateQueueMessageVisibilityCommand<Q> {
    async fn try_execute(&mut self) -> bool {
        let current = self
            .lease
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match self
            .queue
            .update_message_visibility(&current, self.visibility_timeout)
            .await
        {
            Ok(renewed) => {
                trace!(queue = %self.queue.name(), message = %current.message_id, "lease renewed");
                *self.lease.lock().unwrap_or_else(PoisonError::into_inner) = renewed;
                true
            }
            Err(e) if e.is_transient() => {
                debug!(queue = %self.queue.name(), message = %current.message_id, error = %e, "lease renewal failed; will retry");
                false
            }
            Err(e) => {
                warn!(queue = %self.queue.name(), message = %current.message_id, error = %e, "lease renewal failed");
                false
            }
        }
    }
}
