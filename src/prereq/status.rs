// src/prereq/status.rs

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::errors::StorageResult;
use crate::triggers::invocation::InvocationRequest;
use crate::types::{FunctionStatus, InvocationId};

/// Read access to the status of function invocations.
///
/// `Ok(None)` means the oracle has never heard of the invocation.
pub trait StatusOracle: Send + Sync {
    fn get_status(
        &self,
        id: InvocationId,
    ) -> impl Future<Output = StorageResult<Option<FunctionStatus>>> + Send;
}

#[derive(Debug, Clone)]
struct InstanceRecord {
    request: InvocationRequest,
    status: FunctionStatus,
}

/// In-process record of every invocation this host has queued.
///
/// Cloning shares the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct FunctionInstanceStore {
    inner: Arc<Mutex<HashMap<InvocationId, InstanceRecord>>>,
}

impl FunctionInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly queued invocation.
    pub fn insert_queued(&self, request: InvocationRequest) {
        let id = request.id;
        let previous = self.lock().insert(
            id,
            InstanceRecord {
                request,
                status: FunctionStatus::Queued,
            },
        );
        if previous.is_some() {
            warn!(invocation = %id, "invocation was queued twice; status reset to Queued");
        }
    }

    /// Move a `Queued` invocation to `Running` and hand back its request.
    ///
    /// Returns `None` for unknown invocations and for ones that already left
    /// the `Queued` state, so repeated activations start the work only once.
    pub fn try_start(&self, id: InvocationId) -> Option<InvocationRequest> {
        let mut records = self.lock();
        let record = records.get_mut(&id)?;
        if record.status != FunctionStatus::Queued {
            debug!(invocation = %id, status = ?record.status, "ignoring activation");
            return None;
        }
        record.status = FunctionStatus::Running;
        Some(record.request.clone())
    }

    /// Set the final status of an invocation.
    ///
    /// Non-terminal statuses are ignored; only `try_start` and
    /// `insert_queued` move an invocation between live states.
    pub fn complete(&self, id: InvocationId, status: FunctionStatus) {
        if !status.is_terminal() {
            warn!(invocation = %id, ?status, "ignoring non-terminal completion status");
            return;
        }
        match self.lock().get_mut(&id) {
            Some(record) => record.status = status,
            None => warn!(invocation = %id, "completion for unknown invocation"),
        }
    }

    pub fn status(&self, id: InvocationId) -> Option<FunctionStatus> {
        self.lock().get(&id).map(|r| r.status)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InvocationId, InstanceRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusOracle for FunctionInstanceStore {
    async fn get_status(&self, id: InvocationId) -> StorageResult<Option<FunctionStatus>> {
        Ok(self.status(id))
    }
}
