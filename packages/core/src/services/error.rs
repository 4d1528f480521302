//! Service Layer Error Types
//!
//! [`ServiceError`] is the taxonomy every engine operation reports. Public
//! operations that hand back result objects (push, pull, import, restore)
//! flatten it into a [`FailureKind`] plus message instead of returning `Err`.

use crate::db::StoreError;
use crate::models::{EntityKind, ValidationError};
use crate::remote::RemoteError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Remote backend unavailable or unauthenticated
    #[error("Remote store is not configured or not authenticated")]
    NotConfigured,

    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Unparsable or incompatible input document
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Another operation holds the lease for this scope
    #[error("Operation already in progress for {scope}")]
    Busy { scope: String },

    /// A multi-step remote sequence failed after it started writing
    #[error("Remote sequence failed during {stage}: {message}")]
    PartialRemoteFailure { stage: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Desktop tree or cross-reference constraint violated
    #[error("Hierarchy constraint violated: {0}")]
    Hierarchy(String),

    #[error("Local store error: {0}")]
    Store(StoreError),

    #[error("Remote store error: {0}")]
    Remote(RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store(other),
        }
    }
}

impl From<RemoteError> for ServiceError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotConfigured => Self::NotConfigured,
            other => Self::Remote(other),
        }
    }
}

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn busy(scope: impl Into<String>) -> Self {
        Self::Busy {
            scope: scope.into(),
        }
    }

    pub fn hierarchy(msg: impl Into<String>) -> Self {
        Self::Hierarchy(msg.into())
    }

    /// Wrap a remote error raised during `stage` of push or pull
    pub fn remote_stage(stage: &str, error: RemoteError) -> Self {
        match error {
            RemoteError::NotConfigured => Self::NotConfigured,
            other => Self::PartialRemoteFailure {
                stage: stage.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotConfigured => FailureKind::NotConfigured,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::MalformedInput(_) | Self::Serialization(_) => FailureKind::MalformedInput,
            Self::Busy { .. } => FailureKind::Busy,
            Self::PartialRemoteFailure { .. } | Self::Remote(_) => {
                FailureKind::PartialRemoteFailure
            }
            Self::Validation(_) => FailureKind::Validation,
            Self::Hierarchy(_) => FailureKind::Hierarchy,
            Self::Store(_) => FailureKind::Storage,
        }
    }
}

/// Failure category carried by operation result objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotConfigured,
    NotFound,
    MalformedInput,
    Busy,
    PartialRemoteFailure,
    Validation,
    Hierarchy,
    Storage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_service_not_found() {
        let err: ServiceError = StoreError::not_found(EntityKind::Desktop, "d1").into();
        assert!(matches!(err, ServiceError::NotFound { kind: EntityKind::Desktop, .. }));
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[test]
    fn test_remote_stage_keeps_not_configured() {
        let err = ServiceError::remote_stage("upload notes", RemoteError::NotConfigured);
        assert_eq!(err.kind(), FailureKind::NotConfigured);

        let err = ServiceError::remote_stage(
            "upload notes",
            RemoteError::storage("a.png", "quota exceeded"),
        );
        assert_eq!(err.kind(), FailureKind::PartialRemoteFailure);
        assert!(err.to_string().contains("upload notes"));
    }
}
