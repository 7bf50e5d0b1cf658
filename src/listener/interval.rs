// src/listener/interval.rs

use std::future::Future;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{HostError, Result};

/// A command that is executed repeatedly, waiting
/// [`separation_interval`](Self::separation_interval) between runs.
///
/// The interval is read after every execution, so a command can adjust it
/// based on what it just did.
pub trait IntervalSeparationCommand: Send {
    fn separation_interval(&self) -> Duration;

    fn execute(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A command that reports success or failure instead of erroring.
pub trait CanFailCommand: Send {
    fn try_execute(&mut self) -> impl Future<Output = bool> + Send;
}

/// Runs a [`CanFailCommand`] on a normal interval, and retries faster while
/// it keeps failing.
///
/// After `n` consecutive failures the interval is
/// `normal / (divisor * n)`, never below `minimum`. One success restores the
/// normal interval.
#[derive(Debug)]
pub struct LinearSpeedupTimerCommand<C> {
    inner: C,
    normal: Duration,
    minimum: Duration,
    divisor: u32,
    failures: u32,
}

impl<C: CanFailCommand> LinearSpeedupTimerCommand<C> {
    pub fn new(inner: C, normal: Duration, minimum: Duration, divisor: u32) -> Result<Self> {
        if minimum > normal {
            return Err(HostError::ConfigError(format!(
                "minimum interval {minimum:?} exceeds normal interval {normal:?}"
            )));
        }
        if divisor < 1 {
            return Err(HostError::ConfigError(
                "failure speedup divisor must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner,
            normal,
            minimum,
            divisor,
            failures: 0,
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

impl<C: CanFailCommand> IntervalSeparationCommand for LinearSpeedupTimerCommand<C> {
    fn separation_interval(&self) -> Duration {
        if self.failures == 0 {
            return self.normal;
        }
        let speedup = self.divisor.saturating_mul(self.failures);
        (self.normal / speedup).max(self.minimum)
    }

    async fn execute(&mut self) -> Result<()> {
        if self.inner.try_execute().await {
            self.failures = 0;
        } else {
            self.failures = self.failures.saturating_add(1);
        }
        Ok(())
    }
}

/// Background task running an [`IntervalSeparationCommand`] until stopped.
///
/// Dropping the timer aborts the task; [`stop`](Self::stop) lets an
/// in-flight execution finish first.
#[derive(Debug)]
pub struct IntervalSeparationTimer {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IntervalSeparationTimer {
    /// Spawn the timer. With `execute_first = false` the first execution
    /// happens after one separation interval.
    pub fn start<C>(mut command: C, execute_first: bool) -> Self
    where
        C: IntervalSeparationCommand + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            if !execute_first {
                tokio::select! {
                    _ = &mut cancel_rx => return,
                    _ = tokio::time::sleep(command.separation_interval()) => {}
                }
            }

            loop {
                if let Err(e) = command.execute().await {
                    warn!(error = %e, "timer command failed");
                }
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = tokio::time::sleep(command.separation_interval()) => {}
                }
            }
        });

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Stop the timer and wait for its task to exit.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!(error = %e, "timer task ended abnormally");
            }
        }
    }
}

impl Drop for IntervalSeparationTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Drive `command` until `shutdown` flips to `true` (or its sender goes away).
///
/// The flag is checked once per iteration; a running execution is never
/// interrupted. Errors are logged and the loop carries on.
pub async fn run_interval_command<C>(mut command: C, mut shutdown: watch::Receiver<bool>)
where
    C: IntervalSeparationCommand,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = command.execute().await {
            warn!(error = %e, "poll iteration failed");
        }

        let wait = command.separation_interval();
        if wait.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("interval command loop stopped");
}
