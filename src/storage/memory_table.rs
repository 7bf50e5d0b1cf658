// src/storage/memory_table.rs

//! In-memory [`Table`] used by the local host and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::errors::{StorageError, StorageResult};
use crate::storage::table::{GenericEntity, Table, TableRow, TableService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Upsert,
    Insert,
}

#[derive(Debug)]
struct PendingWrite {
    kind: WriteKind,
    partition: String,
    row: String,
    entity: GenericEntity,
}

#[derive(Debug, Default)]
struct TableState {
    committed: BTreeMap<String, BTreeMap<String, GenericEntity>>,
    pending: Vec<PendingWrite>,
    write_count: usize,
    flush_count: usize,
    next_flush_failure: Option<StorageError>,
}

/// Cloneable handle to a shared in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    name: String,
    state: Arc<Mutex<TableState>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of `upsert` / `insert` calls accepted so far.
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    /// Number of flushes that had pending writes to commit.
    pub fn flush_count(&self) -> usize {
        self.lock().flush_count
    }

    /// Committed rows in `partition`.
    pub fn partition_len(&self, partition: &str) -> usize {
        self.lock()
            .committed
            .get(partition)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Total committed rows across all partitions.
    pub fn row_count(&self) -> usize {
        self.lock().committed.values().map(BTreeMap::len).sum()
    }

    /// Make the next flush fail with `err` without committing anything.
    pub fn fail_next_flush(&self, err: StorageError) {
        self.lock().next_flush_failure = Some(err);
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer(&self, kind: WriteKind, partition: &str, row: &str, entity: GenericEntity) {
        let mut state = self.lock();
        state.write_count += 1;
        state.pending.push(PendingWrite {
            kind,
            partition: partition.to_string(),
            row: row.to_string(),
            entity,
        });
    }
}

impl Table for MemoryTable {
    async fn upsert(&self, partition: &str, row: &str, entity: GenericEntity) -> StorageResult<()> {
        self.buffer(WriteKind::Upsert, partition, row, entity);
        Ok(())
    }

    async fn insert(&self, partition: &str, row: &str, entity: GenericEntity) -> StorageResult<()> {
        self.buffer(WriteKind::Insert, partition, row, entity);
        Ok(())
    }

    async fn get(&self, partition: &str, row: &str) -> StorageResult<Option<GenericEntity>> {
        Ok(self
            .lock()
            .committed
            .get(partition)
            .and_then(|rows| rows.get(row))
            .cloned())
    }

    async fn enumerate(&self, partition: &str) -> StorageResult<Vec<TableRow>> {
        let state = self.lock();
        let rows = state
            .committed
            .get(partition)
            .map(|rows| {
                rows.iter()
                    .map(|(row, entity)| TableRow {
                        partition_key: partition.to_string(),
                        row_key: row.clone(),
                        entity: entity.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn delete(&self, partition: &str, row: Option<&str>) -> StorageResult<()> {
        let mut state = self.lock();
        match row {
            Some(row) => {
                let now_empty = match state.committed.get_mut(partition) {
                    Some(rows) => {
                        rows.remove(row);
                        rows.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.committed.remove(partition);
                }
            }
            None => {
                state.committed.remove(partition);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> StorageResult<()> {
        let mut state = self.lock();

        if let Some(err) = state.next_flush_failure.take() {
            state.pending.clear();
            return Err(err);
        }

        if state.pending.is_empty() {
            return Ok(());
        }
        state.flush_count += 1;

        let mut batches: HashMap<String, Vec<PendingWrite>> = HashMap::new();
        for write in state.pending.drain(..) {
            batches.entry(write.partition.clone()).or_default().push(write);
        }

        let mut first_error = None;
        for (partition, batch) in batches {
            let existing = state.committed.get(&partition);
            let mut seen: Vec<&str> = Vec::new();
            let conflict = batch.iter().find(|w| {
                let dup = w.kind == WriteKind::Insert
                    && (existing.is_some_and(|rows| rows.contains_key(&w.row))
                        || seen.contains(&w.row.as_str()));
                seen.push(w.row.as_str());
                dup
            });

            if let Some(w) = conflict {
                // The whole partition batch is rejected.
                first_error.get_or_insert(StorageError::Conflict {
                    partition: partition.clone(),
                    row: w.row.clone(),
                });
                continue;
            }

            trace!(table = %self.name, %partition, rows = batch.len(), "committing batch");
            let rows = state.committed.entry(partition).or_default();
            for w in batch {
                rows.insert(w.row, w.entity);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Hands out shared [`MemoryTable`]s by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableService {
    tables: Arc<Mutex<HashMap<String, MemoryTable>>>,
}

impl MemoryTableService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableService for MemoryTableService {
    type Table = MemoryTable;

    fn table(&self, name: &str) -> MemoryTable {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(name.to_string())
            .or_insert_with(|| MemoryTable::new(name))
            .clone()
    }
}
