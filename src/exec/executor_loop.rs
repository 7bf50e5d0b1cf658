// src/exec/executor_loop.rs

//! Activation loop of the local execution queue.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::exec::local_queue::QueueState;
use crate::storage::table::Table;
use crate::triggers::invocation::InvocationRequest;
use crate::triggers::model::FunctionDefinition;
use crate::types::{FunctionStatus, InvocationId};

/// Spawn the loop that starts activated invocations.
///
/// Each activation whose instance is still `Queued` runs in its own Tokio
/// task; repeated activations of the same instance are ignored.
pub(crate) fn spawn_activation_loop<T: Table + 'static>(
    state: Arc<QueueState<T>>,
    mut rx: mpsc::UnboundedReceiver<InvocationId>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("activation loop started");
        loop {
            tokio::select! {
                activation = rx.recv() => match activation {
                    Some(id) => handle_activation(&state, id),
                    None => break,
                },
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        info!("activation loop finished");
    })
}

fn handle_activation<T: Table + 'static>(state: &Arc<QueueState<T>>, id: InvocationId) {
    let Some(request) = state.store.try_start(id) else {
        debug!(invocation = %id, "activation ignored");
        state.activator.finished();
        return;
    };

    let Some(function) = state.functions.get(&request.location.id()).cloned() else {
        warn!(invocation = %id, function = %request.location, "activated invocation of unknown function");
        state.store.complete(id, FunctionStatus::NeverFinished);
        state.activator.finished();
        return;
    };

    let state = state.clone();
    tokio::spawn(async move {
        run_invocation(&state, &function, &request).await;
        state.activator.finished();
    });
}

async fn run_invocation<T: Table>(
    state: &QueueState<T>,
    function: &FunctionDefinition,
    request: &InvocationRequest,
) {
    info!(
        invocation = %request.id,
        function = %request.location,
        reason = %request.trigger_reason,
        "invocation started"
    );

    let status = match state.runner.run(function, request).await {
        Ok(outcome) => {
            for output in &outcome.outputs {
                if let Err(e) = state.outputs.publish(request.id, output).await {
                    warn!(invocation = %request.id, ?output, error = %e, "failed to publish output");
                }
            }
            if outcome.success {
                FunctionStatus::CompletedSuccess
            } else {
                FunctionStatus::CompletedFailed
            }
        }
        Err(e) => {
            error!(invocation = %request.id, error = %e, "function runner failed");
            FunctionStatus::NeverFinished
        }
    };

    state.store.complete(request.id, status);
    info!(invocation = %request.id, function = %request.location, ?status, "invocation finished");

    if let Err(e) = state.prereqs.on_complete(request.id, &state.activator).await {
        error!(invocation = %request.id, error = %e, "failed to release successors");
    }
}
