// src/listener/mod.rs

//! Queue polling with lease renewal.
//!
//! - [`interval`] has the command contracts, the background
//!   [`IntervalSeparationTimer`] and the back-off policy used for renewals.
//! - [`visibility`] extends a message lease.
//! - [`poll_queue`] is the per-queue listener: lease a message, keep the
//!   lease alive while a [`TriggerExecutor`] runs, then ack or abandon.

pub mod interval;
pub mod poll_queue;
pub mod visibility;

pub use interval::{
    CanFailCommand, IntervalSeparationCommand, IntervalSeparationTimer, LinearSpeedupTimerCommand,
    run_interval_command,
};
pub use poll_queue::{
    PollQueueCommand, PollQueueOptions, TriggerExecutor, poison_queue_name, spawn_queue_listener,
};
pub use visibility::UpdateQueueMessageVisibilityCommand;
