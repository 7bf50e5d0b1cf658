//! Test doubles for the scheduler's collaborators.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobhost::errors::{HostError, Result, StorageResult};
use jobhost::exec::{ExecutionQueue, FunctionOutput, FunctionRunner, RunOutcome};
use jobhost::listener::TriggerExecutor;
use jobhost::prereq::{Activator, StatusOracle};
use jobhost::storage::QueueMessage;
use jobhost::triggers::{FunctionDefinition, InvocationRequest};
use jobhost::types::{FunctionStatus, InvocationId};

/// Records every activation, in order.
#[derive(Debug, Default)]
pub struct RecordingActivator {
    activations: Mutex<Vec<InvocationId>>,
}

impl RecordingActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activations(&self) -> Vec<InvocationId> {
        self.activations.lock().unwrap().clone()
    }

    pub fn count_for(&self, id: InvocationId) -> usize {
        self.activations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| **a == id)
            .count()
    }
}

impl Activator for RecordingActivator {
    fn activate_function(&self, id: InvocationId) {
        self.activations.lock().unwrap().push(id);
    }
}

/// Status oracle whose answers the test sets directly. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct StaticStatusOracle {
    statuses: Arc<Mutex<HashMap<InvocationId, FunctionStatus>>>,
    lookups: Arc<AtomicUsize>,
}

impl StaticStatusOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: InvocationId, status: FunctionStatus) {
        self.statuses.lock().unwrap().insert(id, status);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl StatusOracle for StaticStatusOracle {
    async fn get_status(&self, id: InvocationId) -> StorageResult<Option<FunctionStatus>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.statuses.lock().unwrap().get(&id).copied())
    }
}

/// Trigger executor that replays scripted results, optionally taking a
/// while for each message. Clones share state.
#[derive(Debug, Clone)]
pub struct ScriptedTriggerExecutor {
    results: Arc<Mutex<VecDeque<bool>>>,
    default_result: bool,
    delay: Duration,
    failure: Option<String>,
    seen: Arc<Mutex<Vec<QueueMessage>>>,
}

impl ScriptedTriggerExecutor {
    /// Always reports `result`.
    pub fn always(result: bool) -> Self {
        Self::scripted(&[], result)
    }

    /// Reports `results` in order, then `default_result`.
    pub fn scripted(results: &[bool], default_result: bool) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.iter().copied().collect())),
            default_result,
            delay: Duration::ZERO,
            failure: None,
            seen: Arc::default(),
        }
    }

    /// Fails every call with `HostError::InvalidOperation(reason)`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::always(false)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn seen(&self) -> Vec<QueueMessage> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl TriggerExecutor for ScriptedTriggerExecutor {
    async fn execute(&self, message: &QueueMessage) -> Result<bool> {
        self.seen.lock().unwrap().push(message.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(HostError::InvalidOperation(reason.clone()));
        }
        let next = self.results.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.default_result))
    }
}

/// Function runner that never spawns processes.
///
/// Functions listed as failing report a non-zero exit; others succeed and
/// produce their configured outputs. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    failing: Arc<Mutex<HashSet<String>>>,
    outputs: Arc<Mutex<HashMap<String, Vec<FunctionOutput>>>>,
    runs: Arc<Mutex<Vec<InvocationRequest>>>,
    delay: Duration,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `function` is the local function name.
    pub fn fail(&self, function: &str) {
        self.failing.lock().unwrap().insert(function.to_string());
    }

    pub fn produce(&self, function: &str, output: FunctionOutput) {
        self.outputs
            .lock()
            .unwrap()
            .entry(function.to_string())
            .or_default()
            .push(output);
    }

    pub fn runs(&self) -> Vec<InvocationRequest> {
        self.runs.lock().unwrap().clone()
    }

    /// Local names of the functions run so far, in start order.
    pub fn run_names(&self) -> Vec<String> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.location.name.clone())
            .collect()
    }
}

impl FunctionRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        function: &'a FunctionDefinition,
        request: &'a InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RunOutcome>> + Send + 'a>> {
        Box::pin(async move {
            self.runs.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let name = &function.location.name;
            if self.failing.lock().unwrap().contains(name) {
                return Ok(RunOutcome::failed(Some(1)));
            }
            let outputs = self
                .outputs
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default();
            Ok(RunOutcome::succeeded(outputs))
        })
    }
}

/// Execution queue that only records what it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutionQueue {
    requests: Arc<Mutex<Vec<InvocationRequest>>>,
    reject: bool,
}

impl RecordingExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that fails every enqueue.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ExecutionQueue for RecordingExecutionQueue {
    fn enqueue(
        &self,
        request: InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.reject {
                return Err(HostError::InvalidOperation("queue rejects everything".into()));
            }
            self.requests.lock().unwrap().push(request);
            Ok(())
        })
    }
}
