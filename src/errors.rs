// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::triggers::blob_path::BlobPathError;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A usage bug such as a duplicate-key insert where an upsert was
    /// expected. Never retried.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Blob path error: {0}")]
    BlobPath(#[from] BlobPathError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures reported by the table and queue collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Network or server-side failure; retry on the next tick.
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("conflict writing {partition}/{row}")]
    Conflict { partition: String, row: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("lease lost for message {0}")]
    LeaseLost(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HostError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;
