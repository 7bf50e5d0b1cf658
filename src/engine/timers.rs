// src/engine/timers.rs

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::TriggerEvent;
use crate::errors::{HostError, Result};
use crate::listener::interval::{IntervalSeparationCommand, run_interval_command};

/// Sends a timer event for one function on every execution.
#[derive(Debug)]
struct TimerTickCommand {
    function_id: String,
    interval: Duration,
    tx: mpsc::Sender<TriggerEvent>,
}

impl IntervalSeparationCommand for TimerTickCommand {
    fn separation_interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&mut self) -> Result<()> {
        debug!(function = %self.function_id, "timer fired");
        self.tx
            .send(TriggerEvent::Timer {
                function_id: self.function_id.clone(),
            })
            .await
            .map_err(|_| HostError::InvalidOperation("worker stopped".to_string()))
    }
}

/// Fire `function_id` every `interval`, starting one interval from now,
/// until `shutdown` becomes `true`.
pub fn spawn_timer_trigger(
    function_id: String,
    interval: Duration,
    tx: mpsc::Sender<TriggerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(function = %function_id, ?interval, "timer trigger started");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => return,
        }
        let command = TimerTickCommand {
            function_id,
            interval,
            tx,
        };
        run_interval_command(command, shutdown).await;
    })
}
