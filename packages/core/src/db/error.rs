//! Local Persistence Error Types
//!
//! Errors raised by the key-value backends and the entity store built on them.

use crate::models::EntityKind;
use std::path::PathBuf;
use thiserror::Error;

/// Local store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// Backend rejected or failed an operation
    #[error("Storage backend failed: {context}")]
    Backend { context: String },

    /// State blob could not be encoded or decoded
    #[error("State serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state has a schema this build cannot read
    #[error("Persisted state is unreadable: {0}")]
    CorruptState(String),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    pub fn backend(context: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
