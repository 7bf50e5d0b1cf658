// src/exec/backend.rs

//! Pluggable execution abstractions.
//!
//! The worker talks to an [`ExecutionQueue`] instead of running anything
//! itself, and the local execution queue runs invocations through a
//! [`FunctionRunner`] and publishes what they produced through an
//! [`OutputSink`]. Tests swap in fakes for all three.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::triggers::blob_path::BlobPath;
use crate::triggers::invocation::InvocationRequest;
use crate::triggers::model::FunctionDefinition;
use crate::types::InvocationId;

/// Accepts invocation requests for (eventual) execution.
pub trait ExecutionQueue: Send + Sync {
    /// Queue `request`. It runs once all of its prerequisites succeeded.
    fn enqueue(
        &self,
        request: InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl<X: ExecutionQueue + ?Sized> ExecutionQueue for Arc<X> {
    fn enqueue(
        &self,
        request: InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).enqueue(request)
    }
}

/// Something an invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionOutput {
    Queue { queue: String, payload: String },
    Blob(BlobPath),
}

/// Result of running one invocation to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub outputs: Vec<FunctionOutput>,
}

impl RunOutcome {
    pub fn succeeded(outputs: Vec<FunctionOutput>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            outputs,
        }
    }

    pub fn failed(exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            exit_code,
            outputs: Vec::new(),
        }
    }
}

/// Runs the body of a function.
///
/// An `Err` means the runner could not tell whether the function succeeded;
/// the instance is then recorded as never finished.
pub trait FunctionRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        function: &'a FunctionDefinition,
        request: &'a InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RunOutcome>> + Send + 'a>>;
}

/// Publishes outputs of an invocation, stamped with the producer's id.
pub trait OutputSink: Send + Sync {
    fn publish<'a>(
        &'a self,
        producer: InvocationId,
        output: &'a FunctionOutput,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
