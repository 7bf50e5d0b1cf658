// src/exec/local_queue.rs

//! Host-side execution queue.
//!
//! Queued requests are recorded in a [`FunctionInstanceStore`] and their
//! prerequisites registered with a [`PrereqManager`]. Activated
//! invocations are picked up by the activation loop (see
//! [`executor_loop`](crate::exec::executor_loop)), run through a
//! [`FunctionRunner`], and reported back so their successors can start.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::errors::{HostError, Result};
use crate::exec::backend::{ExecutionQueue, FunctionRunner, OutputSink};
use crate::exec::executor_loop::spawn_activation_loop;
use crate::prereq::manager::{Activator, PREREQ_TABLE_NAME, PrereqManager, SUCCESSOR_TABLE_NAME};
use crate::prereq::status::FunctionInstanceStore;
use crate::storage::table::{Table, TableService};
use crate::triggers::invocation::{InvocationBuilder, InvocationRequest};
use crate::triggers::model::FunctionDefinition;
use crate::types::{FunctionStatus, InvocationId};

/// [`Activator`] that hands activated ids to the activation loop.
///
/// Tracks how many activations are queued or running, which is what
/// [`LocalExecutionQueue::wait_idle`] waits on.
#[derive(Debug)]
pub struct ChannelActivator {
    tx: mpsc::UnboundedSender<InvocationId>,
    in_flight: watch::Sender<usize>,
}

impl ChannelActivator {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InvocationId>) -> Self {
        Self {
            tx,
            in_flight: watch::Sender::new(0),
        }
    }

    /// Called once the activation loop is done with one activation.
    pub(crate) fn finished(&self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }
}

impl Activator for ChannelActivator {
    fn activate_function(&self, id: InvocationId) {
        self.in_flight.send_modify(|n| *n += 1);
        if self.tx.send(id).is_err() {
            warn!(invocation = %id, "activation loop stopped; dropping activation");
            self.finished();
        }
    }
}

/// Shared state of a [`LocalExecutionQueue`].
pub(crate) struct QueueState<T> {
    pub(crate) functions: HashMap<String, FunctionDefinition>,
    pub(crate) builder: InvocationBuilder,
    pub(crate) store: FunctionInstanceStore,
    pub(crate) prereqs: PrereqManager<T, FunctionInstanceStore>,
    pub(crate) activator: ChannelActivator,
    pub(crate) runner: Arc<dyn FunctionRunner>,
    pub(crate) outputs: Arc<dyn OutputSink>,
}

/// Cloneable handle to the local execution queue.
pub struct LocalExecutionQueue<T> {
    state: Arc<QueueState<T>>,
}

impl<T> Clone for LocalExecutionQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Table + 'static> LocalExecutionQueue<T> {
    /// Build the queue over the prerequisite tables of `tables` and start
    /// its activation loop, which runs until `shutdown` becomes `true`.
    pub fn start<S>(
        functions: Vec<FunctionDefinition>,
        tables: &S,
        runner: Arc<dyn FunctionRunner>,
        outputs: Arc<dyn OutputSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self
    where
        S: TableService<Table = T>,
    {
        let store = FunctionInstanceStore::new();
        let prereqs = PrereqManager::new(
            tables.table(PREREQ_TABLE_NAME),
            tables.table(SUCCESSOR_TABLE_NAME),
            store.clone(),
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let state = Arc::new(QueueState {
            functions: functions.into_iter().map(|f| (f.id(), f)).collect(),
            builder: InvocationBuilder::default(),
            store,
            prereqs,
            activator: ChannelActivator::new(tx),
            runner,
            outputs,
        });
        spawn_activation_loop(state.clone(), rx, shutdown);

        Self { state }
    }

    pub fn store(&self) -> &FunctionInstanceStore {
        &self.state.store
    }

    pub fn prereqs(&self) -> &PrereqManager<T, FunctionInstanceStore> {
        &self.state.prereqs
    }

    /// Activations queued or running right now.
    pub fn in_flight(&self) -> usize {
        self.state.activator.in_flight()
    }

    /// Wait until no activation is queued or running.
    ///
    /// Invocations blocked on unfinished (or failed) prerequisites do not
    /// count.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.activator.in_flight.subscribe();
        // The sender lives in `self.state`, so this cannot observe a close.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Queue `request`: record it as `Queued` and register its prerequisites.
    pub async fn submit(&self, request: InvocationRequest) -> Result<()> {
        let function = request.location.id();
        if !self.state.functions.contains_key(&function) {
            return Err(HostError::UnknownFunction(function));
        }

        let id = request.id;
        let prereqs = request.prereqs.clone();
        debug!(invocation = %id, %function, prereqs = prereqs.len(), "invocation queued");
        self.state.store.insert_queued(request);

        if let Err(e) = self
            .state
            .prereqs
            .add_prereq(id, &prereqs, &self.state.activator)
            .await
        {
            self.state.store.complete(id, FunctionStatus::NeverFinished);
            return Err(e);
        }
        Ok(())
    }

    /// Invoke `function` explicitly, after `prereqs` have all succeeded.
    ///
    /// `function` is either a full function id (`scope.name`) or a name that
    /// is unique among the configured functions.
    pub async fn call(
        &self,
        function: &str,
        args: BTreeMap<String, String>,
        prereqs: Vec<InvocationId>,
    ) -> Result<InvocationId> {
        let definition = self.resolve(function)?;
        let request = self.state.builder.for_call(definition, args, prereqs, None);
        let id = request.id;
        self.submit(request).await?;
        Ok(id)
    }

    fn resolve(&self, function: &str) -> Result<&FunctionDefinition> {
        if let Some(definition) = self.state.functions.get(function) {
            return Ok(definition);
        }
        let mut by_name = self
            .state
            .functions
            .values()
            .filter(|f| f.location.name == function);
        match (by_name.next(), by_name.next()) {
            (Some(definition), None) => Ok(definition),
            (Some(_), Some(_)) => Err(HostError::InvalidOperation(format!(
                "function name '{function}' is ambiguous; use its full id"
            ))),
            (None, _) => Err(HostError::UnknownFunction(function.to_string())),
        }
    }
}

impl<T: Table + 'static> ExecutionQueue for LocalExecutionQueue<T> {
    fn enqueue(
        &self,
        request: InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.submit(request))
    }
}
