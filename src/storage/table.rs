// src/storage/table.rs

use std::future::Future;

use crate::errors::{StorageError, StorageResult};

/// Untyped table payload: an ordered list of `(name, value)` string pairs.
///
/// Encoding is explicit (see [`GenericEntity::encode`] /
/// [`GenericEntity::decode`]) so stores that persist rows as a single string
/// column do not need any serializer hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericEntity {
    properties: Vec<(String, String)>,
}

impl GenericEntity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter. Replaces an existing property of the same name
    /// in place, keeping its position.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Encode as `name=value` pairs joined by `;`, escaping `%`, `=` and `;`.
    pub fn encode(&self) -> String {
        self.properties
            .iter()
            .map(|(n, v)| format!("{}={}", escape(n), escape(v)))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn decode(encoded: &str) -> StorageResult<Self> {
        let mut entity = GenericEntity::new();
        if encoded.is_empty() {
            return Ok(entity);
        }

        for pair in encoded.split(';') {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                StorageError::Encoding(format!("property '{pair}' is missing '='"))
            })?;
            entity
                .properties
                .push((unescape(name)?, unescape(value)?));
        }
        Ok(entity)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '=' => out.push_str("%3D"),
            ';' => out.push_str("%3B"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> StorageResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3).ok_or_else(|| {
            StorageError::Encoding(format!("truncated escape in '{s}'"))
        })?;
        match code {
            "25" => out.push('%'),
            "3D" => out.push('='),
            "3B" => out.push(';'),
            other => {
                return Err(StorageError::Encoding(format!(
                    "unknown escape '%{other}' in '{s}'"
                )));
            }
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

/// One committed row as returned by [`Table::enumerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub entity: GenericEntity,
}

/// Partition/row keyed durable store.
///
/// Writes (`upsert` / `insert`) are buffered and only become visible after
/// [`Table::flush`]. A flush commits the pending writes of each partition as
/// one atomic batch; batches of different partitions are independent.
/// Deletes apply immediately.
pub trait Table: Send + Sync {
    fn upsert(
        &self,
        partition: &str,
        row: &str,
        entity: GenericEntity,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Like `upsert`, but the flush fails with [`StorageError::Conflict`] if
    /// the row already exists.
    fn insert(
        &self,
        partition: &str,
        row: &str,
        entity: GenericEntity,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn get(
        &self,
        partition: &str,
        row: &str,
    ) -> impl Future<Output = StorageResult<Option<GenericEntity>>> + Send;

    fn enumerate(&self, partition: &str)
    -> impl Future<Output = StorageResult<Vec<TableRow>>> + Send;

    /// Delete one row, or the whole partition when `row` is `None`.
    fn delete(
        &self,
        partition: &str,
        row: Option<&str>,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn flush(&self) -> impl Future<Output = StorageResult<()>> + Send;
}

/// Factory for named tables.
pub trait TableService: Send + Sync {
    type Table: Table + Clone + 'static;

    fn table(&self, name: &str) -> Self::Table;
}
