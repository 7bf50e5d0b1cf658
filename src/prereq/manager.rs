// src/prereq/manager.rs

use tracing::{debug, info, trace, warn};

use crate::errors::{HostError, Result, StorageError};
use crate::prereq::status::StatusOracle;
use crate::storage::table::{GenericEntity, Table};
use crate::types::{FunctionStatus, InvocationId};

/// Table holding `partition = successor, row = prerequisite`.
pub const PREREQ_TABLE_NAME: &str = "schedPrereqTable";
/// Table holding `partition = prerequisite, row = successor`.
pub const SUCCESSOR_TABLE_NAME: &str = "schedSuccessorTable";

/// Receives invocations that have no outstanding prerequisites.
///
/// Called synchronously from inside the manager; implementations must not
/// block.
pub trait Activator: Send + Sync {
    fn activate_function(&self, id: InvocationId);
}

/// Persists "run after" edges between invocations and activates successors
/// once every prerequisite has completed successfully.
///
/// Each edge P -> S is written twice: `(S, P)` into the prereq table and
/// `(P, S)` into the successor table. Readiness is always re-derived from
/// row presence in the prereq table, so several hosts may share the tables
/// without any lock. A crash between the two halves of an update can leave
/// a stale row behind; activation is therefore at-least-once and the
/// activator is expected to be idempotent.
pub struct PrereqManager<T, S> {
    prereq_table: T,
    successor_table: T,
    oracle: S,
}

impl<T: Table, S: StatusOracle> PrereqManager<T, S> {
    pub fn new(prereq_table: T, successor_table: T, oracle: S) -> Self {
        Self {
            prereq_table,
            successor_table,
            oracle,
        }
    }

    pub fn oracle(&self) -> &S {
        &self.oracle
    }

    /// Register `func` as waiting on `prereqs`.
    ///
    /// Prerequisites that already completed successfully are skipped. Any
    /// other status, including an invocation the oracle does not know,
    /// counts as outstanding. When nothing is outstanding `func` is
    /// activated before returning and no table is touched.
    ///
    /// On a write failure the rows this call managed to write are removed
    /// again, so neither table is left holding half of an edge.
    pub async fn add_prereq(
        &self,
        func: InvocationId,
        prereqs: &[InvocationId],
        activator: &dyn Activator,
    ) -> Result<()> {
        let mut outstanding = Vec::new();
        for prereq in prereqs {
            let status = self.oracle.get_status(*prereq).await?;
            if status == Some(FunctionStatus::CompletedSuccess) {
                trace!(invocation = %func, prereq = %prereq, "prerequisite already satisfied");
                continue;
            }
            outstanding.push(*prereq);
        }

        if outstanding.is_empty() {
            debug!(invocation = %func, "no outstanding prerequisites; activating");
            activator.activate_function(func);
            return Ok(());
        }

        if let Err(err) = self.write_edges(func, &outstanding).await {
            self.discard_edges(func, &outstanding).await;
            return Err(err);
        }
        debug!(invocation = %func, outstanding = outstanding.len(), "waiting on prerequisites");
        Ok(())
    }

    /// Notify the manager that `func` finished.
    ///
    /// Only a `CompletedSuccess` status releases successors; for anything
    /// else the edges stay in place and the successors remain blocked.
    pub async fn on_complete(&self, func: InvocationId, activator: &dyn Activator) -> Result<()> {
        let status = self.oracle.get_status(func).await?;
        if status != Some(FunctionStatus::CompletedSuccess) {
            info!(
                invocation = %func,
                ?status,
                "invocation did not succeed; successors stay blocked"
            );
            return Ok(());
        }

        let func_key = func.to_string();
        let successors = self.successor_table.enumerate(&func_key).await?;
        if successors.is_empty() {
            trace!(invocation = %func, "no successors to release");
            return Ok(());
        }

        for row in &successors {
            let successor = parse_key(&row.row_key)?;
            let successor_key = successor.to_string();

            self.prereq_table
                .delete(&successor_key, Some(&func_key))
                .await?;

            if self.is_ready(successor).await? {
                debug!(invocation = %successor, prereq = %func, "last prerequisite done; activating");
                activator.activate_function(successor);
            } else {
                trace!(invocation = %successor, prereq = %func, "prerequisite done; still waiting");
            }
        }

        self.successor_table.delete(&func_key, None).await?;
        Ok(())
    }

    /// True iff `func` has no outstanding prerequisite rows.
    pub async fn is_ready(&self, func: InvocationId) -> Result<bool> {
        Ok(self.pending_prereqs(func).await?.is_empty())
    }

    /// Prerequisites `func` is still waiting on.
    pub async fn pending_prereqs(&self, func: InvocationId) -> Result<Vec<InvocationId>> {
        self.prereq_table
            .enumerate(&func.to_string())
            .await?
            .iter()
            .map(|row| parse_key(&row.row_key))
            .collect()
    }

    async fn write_edges(&self, func: InvocationId, prereqs: &[InvocationId]) -> Result<()> {
        let func_key = func.to_string();
        for prereq in prereqs {
            let prereq_key = prereq.to_string();
            self.successor_table
                .upsert(&prereq_key, &func_key, GenericEntity::new())
                .await?;
            self.prereq_table
                .upsert(&func_key, &prereq_key, GenericEntity::new())
                .await?;
        }

        // Both flushes run so neither table keeps this call's writes buffered.
        let successor_flush = self.successor_table.flush().await;
        let prereq_flush = self.prereq_table.flush().await;
        successor_flush.and(prereq_flush).map_err(map_write_error)
    }

    /// Remove whatever half of a failed `write_edges` reached the tables.
    ///
    /// Best effort: errors are logged and the original failure is what the
    /// caller sees.
    async fn discard_edges(&self, func: InvocationId, prereqs: &[InvocationId]) {
        let func_key = func.to_string();
        for table in [&self.successor_table, &self.prereq_table] {
            if let Err(err) = table.flush().await {
                trace!(invocation = %func, error = %err, "flush while discarding edges failed");
            }
        }
        for prereq in prereqs {
            let prereq_key = prereq.to_string();
            let removed = match self.successor_table.delete(&prereq_key, Some(&func_key)).await {
                Ok(()) => self.prereq_table.delete(&func_key, Some(&prereq_key)).await,
                Err(err) => Err(err),
            };
            if let Err(err) = removed {
                warn!(
                    invocation = %func,
                    prereq = %prereq,
                    error = %err,
                    "could not remove partially written prerequisite edge"
                );
            }
        }
    }
}

fn map_write_error(err: StorageError) -> HostError {
    match err {
        StorageError::Conflict { partition, row } => HostError::InvalidOperation(format!(
            "conflicting prerequisite edge {partition}/{row}"
        )),
        other => HostError::Storage(other),
    }
}

fn parse_key(key: &str) -> Result<InvocationId> {
    key.parse::<InvocationId>()
        .map_err(|e| StorageError::Encoding(format!("bad invocation key '{key}': {e}")).into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::storage::memory_table::MemoryTable;

    #[derive(Default)]
    struct MapOracle(Mutex<HashMap<InvocationId, FunctionStatus>>);

    impl MapOracle {
        fn set(&self, id: InvocationId, status: FunctionStatus) {
            self.0.lock().unwrap().insert(id, status);
        }
    }

    impl StatusOracle for &MapOracle {
        async fn get_status(
            &self,
            id: InvocationId,
        ) -> crate::errors::StorageResult<Option<FunctionStatus>> {
            Ok(self.0.lock().unwrap().get(&id).copied())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<InvocationId>>);

    impl Activator for Recorder {
        fn activate_function(&self, id: InvocationId) {
            self.0.lock().unwrap().push(id);
        }
    }

    #[tokio::test]
    async fn conflict_on_flush_is_an_invalid_operation() {
        let oracle = MapOracle::default();
        let prereq = MemoryTable::new(PREREQ_TABLE_NAME);
        let successor = MemoryTable::new(SUCCESSOR_TABLE_NAME);
        successor.fail_next_flush(StorageError::Conflict {
            partition: "p".into(),
            row: "r".into(),
        });
        let manager = PrereqManager::new(prereq, successor, &oracle);

        let err = manager
            .add_prereq(InvocationId::new(), &[InvocationId::new()], &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidOperation(_)), "{err}");
    }

    #[tokio::test]
    async fn failed_flush_leaves_no_half_written_edge() {
        let oracle = MapOracle::default();
        let prereq = MemoryTable::new(PREREQ_TABLE_NAME);
        let successor = MemoryTable::new(SUCCESSOR_TABLE_NAME);
        successor.fail_next_flush(StorageError::Transient("throttled".into()));
        let manager = PrereqManager::new(prereq.clone(), successor.clone(), &oracle);
        let activator = Recorder::default();

        let (f, p) = (InvocationId::new(), InvocationId::new());
        let err = manager.add_prereq(f, &[p], &activator).await.unwrap_err();
        assert!(matches!(err, HostError::Storage(StorageError::Transient(_))), "{err}");

        // A later, unrelated registration must not commit the failed one.
        let (g, q) = (InvocationId::new(), InvocationId::new());
        manager.add_prereq(g, &[q], &activator).await.unwrap();

        assert_eq!(prereq.partition_len(&f.to_string()), 0);
        assert_eq!(successor.partition_len(&p.to_string()), 0);
        assert_eq!(prereq.partition_len(&g.to_string()), 1);
        assert_eq!(successor.partition_len(&q.to_string()), 1);
        assert!(manager.is_ready(f).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_successor_key_is_reported() {
        let oracle = MapOracle::default();
        let prereq = MemoryTable::new(PREREQ_TABLE_NAME);
        let successor = MemoryTable::new(SUCCESSOR_TABLE_NAME);
        let done = InvocationId::new();
        oracle.set(done, FunctionStatus::CompletedSuccess);
        successor
            .upsert(&done.to_string(), "not-a-guid", GenericEntity::new())
            .await
            .unwrap();
        successor.flush().await.unwrap();

        let manager = PrereqManager::new(prereq, successor, &oracle);
        let err = manager.on_complete(done, &Recorder::default()).await.unwrap_err();
        assert!(matches!(err, HostError::Storage(StorageError::Encoding(_))));
    }
}
