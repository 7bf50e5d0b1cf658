// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] defines the [`ExecutionQueue`], [`FunctionRunner`] and
//!   [`OutputSink`] seams.
//! - [`local_queue`] is the host-side execution queue: instance tracking,
//!   prerequisite registration and the explicit `call` API.
//! - [`executor_loop`] starts activated invocations and reports their
//!   completion.
//! - [`task_runner`] runs a function's command as a child process.
//! - [`directives`] parses the output directives functions print on stdout.
//! - [`outputs`] publishes those outputs onto queues.

pub mod backend;
pub mod directives;
pub mod executor_loop;
pub mod local_queue;
pub mod outputs;
pub mod task_runner;

pub use backend::{ExecutionQueue, FunctionOutput, FunctionRunner, OutputSink, RunOutcome};
pub use local_queue::{ChannelActivator, LocalExecutionQueue};
pub use outputs::QueueOutputSink;
pub use task_runner::ProcessRunner;
