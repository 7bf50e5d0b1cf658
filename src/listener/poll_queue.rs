// src/listener/poll_queue.rs

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::errors::Result;
use crate::listener::interval::{
    IntervalSeparationCommand, IntervalSeparationTimer, LinearSpeedupTimerCommand,
    run_interval_command,
};
use crate::listener::visibility::UpdateQueueMessageVisibilityCommand;
use crate::storage::queue::{QueueMessage, QueueTransport};

/// Processes one leased message.
///
/// `Ok(true)` acks the message. `Ok(false)` or an error abandons it, and the
/// queue redelivers it once the lease expires.
pub trait TriggerExecutor: Send + Sync {
    fn execute(&self, message: &QueueMessage) -> impl Future<Output = Result<bool>> + Send;
}

/// Timing knobs of a queue listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollQueueOptions {
    /// Wait between polls of an empty or missing queue.
    pub poll_interval: Duration,
    /// How long a leased message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// Lower bound of the renewal interval after renewal failures.
    pub min_renewal_interval: Duration,
    pub renewal_failure_divisor: u32,
    /// Messages dequeued more often than this go to the poison queue.
    pub max_dequeue_count: u32,
}

impl Default for PollQueueOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            visibility_timeout: Duration::from_secs(10 * 60),
            min_renewal_interval: Duration::from_secs(60),
            renewal_failure_divisor: 2,
            max_dequeue_count: 5,
        }
    }
}

impl PollQueueOptions {
    /// Renewal interval while renewals succeed: half the visibility timeout.
    pub fn normal_renewal_interval(&self) -> Duration {
        self.visibility_timeout / 2
    }
}

/// Name of the queue that receives messages from `queue` that kept failing.
pub fn poison_queue_name(queue: &str) -> String {
    format!("{queue}-poison")
}

/// One poll cycle per [`execute`](IntervalSeparationCommand::execute).
///
/// A processed message sets the separation interval to zero so a backlog
/// drains without delay; an empty or missing queue restores the normal
/// polling interval.
#[derive(Debug)]
pub struct PollQueueCommand<Q, E> {
    queue: Q,
    poison_queue: Q,
    executor: E,
    options: PollQueueOptions,
    separation: Duration,
}

impl<Q, E> PollQueueCommand<Q, E>
where
    Q: QueueTransport + Clone + 'static,
    E: TriggerExecutor,
{
    pub fn new(queue: Q, poison_queue: Q, executor: E, options: PollQueueOptions) -> Self {
        Self {
            queue,
            poison_queue,
            executor,
            options,
            separation: options.poll_interval,
        }
    }

    async fn poll_once(&mut self) -> Result<()> {
        match self.queue.exists().await {
            Ok(true) => {}
            Ok(false) => {
                trace!(queue = %self.queue.name(), "queue does not exist yet");
                return Ok(());
            }
            Err(e) if e.is_transient() => {
                debug!(queue = %self.queue.name(), error = %e, "existence check failed; skipping cycle");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let message = match self.queue.get_message(self.options.visibility_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) if e.is_transient() => {
                debug!(queue = %self.queue.name(), error = %e, "get_message failed; skipping cycle");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if message.dequeue_count > self.options.max_dequeue_count {
            self.move_to_poison(&message).await?;
        } else {
            self.process_message(message).await?;
        }

        self.separation = Duration::ZERO;
        Ok(())
    }

    async fn process_message(&self, message: QueueMessage) -> Result<()> {
        let lease = Arc::new(Mutex::new(message.lease.clone()));
        let renewal = LinearSpeedupTimerCommand::new(
            UpdateQueueMessageVisibilityCommand::new(
                self.queue.clone(),
                lease.clone(),
                self.options.visibility_timeout,
            ),
            self.options.normal_renewal_interval(),
            self.options.min_renewal_interval,
            self.options.renewal_failure_divisor,
        )?;
        let timer = IntervalSeparationTimer::start(renewal, false);

        debug!(
            queue = %self.queue.name(),
            message = %message.id,
            dequeue_count = message.dequeue_count,
            "processing message"
        );
        let outcome = self.executor.execute(&message).await;
        timer.stop().await;

        match outcome {
            Ok(true) => {
                let current = lease.lock().unwrap_or_else(PoisonError::into_inner).clone();
                match self.queue.delete_message(&current).await {
                    Ok(()) => trace!(queue = %self.queue.name(), message = %message.id, "message acked"),
                    Err(e) => warn!(
                        queue = %self.queue.name(),
                        message = %message.id,
                        error = %e,
                        "failed to delete processed message; it will be redelivered"
                    ),
                }
            }
            Ok(false) => {
                info!(queue = %self.queue.name(), message = %message.id, "message abandoned");
            }
            Err(e) => {
                warn!(queue = %self.queue.name(), message = %message.id, error = %e, "trigger executor failed; message abandoned");
            }
        }
        Ok(())
    }

    async fn move_to_poison(&self, message: &QueueMessage) -> Result<()> {
        warn!(
            queue = %self.queue.name(),
            poison_queue = %self.poison_queue.name(),
            message = %message.id,
            dequeue_count = message.dequeue_count,
            "message exceeded max dequeue count; moving to poison queue"
        );
        self.poison_queue.create_if_not_exists().await?;
        self.poison_queue.add_message(message.payload.clone()).await?;
        if let Err(e) = self.queue.delete_message(&message.lease).await {
            warn!(queue = %self.queue.name(), message = %message.id, error = %e, "failed to delete poison message");
        }
        Ok(())
    }
}

impl<Q, E> IntervalSeparationCommand for PollQueueCommand<Q, E>
where
    Q: QueueTransport + Clone + 'static,
    E: TriggerExecutor,
{
    fn separation_interval(&self) -> Duration {
        self.separation
    }

    async fn execute(&mut self) -> Result<()> {
        self.separation = self.options.poll_interval;
        self.poll_once().await
    }
}

/// Spawn a listener task polling `queue` until `shutdown` becomes `true`.
pub fn spawn_queue_listener<Q, E>(
    queue: Q,
    poison_queue: Q,
    executor: E,
    options: PollQueueOptions,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    Q: QueueTransport + Clone + 'static,
    E: TriggerExecutor + 'static,
{
    let name = queue.name().to_string();
    let command = PollQueueCommand::new(queue, poison_queue, executor, options);
    tokio::spawn(async move {
        info!(queue = %name, "queue listener started");
        run_interval_command(command, shutdown).await;
        info!(queue = %name, "queue listener stopped");
    })
}
