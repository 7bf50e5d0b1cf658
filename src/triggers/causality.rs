// src/triggers/causality.rs

//! Which invocation produced a queue message or a blob.
//!
//! Queue payloads that are JSON objects carry their writer in a
//! `$ParentId` property. Other payloads carry no causality. Blob writers
//! are tracked by [`BlobWriteLog`] and travel in [`BlobWrittenMessage`]s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{StorageError, StorageResult};
use crate::triggers::blob_path::BlobPath;
use crate::types::InvocationId;

pub const PARENT_ID_PROPERTY: &str = "$ParentId";

/// Writer recorded in a queue payload, if any.
pub fn owner_from_payload(payload: &str) -> Option<InvocationId> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get(PARENT_ID_PROPERTY)?.as_str()?.parse().ok()
}

/// Record `owner` as the writer of `payload`.
///
/// Payloads that are not JSON objects are returned unchanged.
pub fn stamp_owner(payload: &str, owner: InvocationId) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(mut map)) => {
            map.insert(PARENT_ID_PROPERTY.to_string(), Value::String(owner.to_string()));
            Value::Object(map).to_string()
        }
        _ => payload.to_string(),
    }
}

/// Notification that a blob was written, posted on the host's blob
/// notification queue.
///
/// `write_id` identifies the write itself, so a notification delivered
/// twice is recognised as the same write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobWrittenMessage {
    pub container: String,
    pub blob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<InvocationId>,
    #[serde(default = "Uuid::new_v4")]
    pub write_id: Uuid,
}

impl BlobWrittenMessage {
    pub fn new(path: &BlobPath, writer: Option<InvocationId>) -> Self {
        Self {
            container: path.container.clone(),
            blob: path.blob.clone(),
            writer,
            write_id: Uuid::new_v4(),
        }
    }

    pub fn path(&self) -> BlobPath {
        BlobPath::new(self.container.clone(), self.blob.clone())
    }

    pub fn to_json(&self) -> StorageResult<String> {
        serde_json::to_string(self).map_err(|e| StorageError::Encoding(e.to_string()))
    }

    pub fn from_json(payload: &str) -> StorageResult<Self> {
        serde_json::from_str(payload).map_err(|e| StorageError::Encoding(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlobWrite {
    sequence: u64,
    write_id: Option<Uuid>,
}

/// Ordered record of blob writes seen by this host.
///
/// Writes are numbered with a monotonically increasing sequence, which is
/// what "older than" means when comparing blobs.
#[derive(Debug, Default)]
pub struct BlobWriteLog {
    next_sequence: u64,
    writes: HashMap<String, BlobWrite>,
}

impl BlobWriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write and return its sequence number.
    pub fn record(&mut self, path: &BlobPath) -> u64 {
        self.insert(path, None)
    }

    /// Record the write announced by `notice`.
    ///
    /// A redelivered notice for the latest write of its blob keeps the
    /// original sequence number.
    pub fn record_notice(&mut self, notice: &BlobWrittenMessage) -> u64 {
        let path = notice.path();
        match self.writes.get(&path.key()) {
            Some(last) if last.write_id == Some(notice.write_id) => last.sequence,
            _ => self.insert(&path, Some(notice.write_id)),
        }
    }

    fn insert(&mut self, path: &BlobPath, write_id: Option<Uuid>) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.writes.insert(path.key(), BlobWrite { sequence, write_id });
        sequence
    }

    pub fn last_write(&self, path: &BlobPath) -> Option<u64> {
        self.writes.get(&path.key()).map(|w| w.sequence)
    }

}
