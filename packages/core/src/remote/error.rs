//! Remote Store Error Types

use super::RemoteTable;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// No backend configured, or no authenticated principal
    #[error("Remote store is not configured or not authenticated")]
    NotConfigured,

    /// Row operation rejected by the remote store
    #[error("Request to '{table}' failed: {message}")]
    Request { table: RemoteTable, message: String },

    /// Blob upload/download/remove failed
    #[error("Storage operation on '{path}' failed: {message}")]
    Storage { path: String, message: String },

    /// A row did not have the expected shape
    #[error("Failed to decode '{table}' row: {message}")]
    Decode { table: RemoteTable, message: String },
}

impl RemoteError {
    pub fn request(table: RemoteTable, message: impl Into<String>) -> Self {
        Self::Request {
            table,
            message: message.into(),
        }
    }

    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn decode(table: RemoteTable, message: impl Into<String>) -> Self {
        Self::Decode {
            table,
            message: message.into(),
        }
    }
}
