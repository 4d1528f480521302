//! Business Services
//!
//! This module contains the engine's business logic services:
//!
//! - `WorkspaceService` - editing of desktops, notes, assets, folders and connections
//! - `SyncEngine` - full-replace push/pull against a remote backend
//! - `VersionManager` - immutable workspace snapshots, restore and diff
//! - `PortableCodec` - self-contained export/import of desktop subtrees
//!
//! Services share one [`crate::db::EntityStore`] and one [`OperationLeases`]
//! registry so overlapping long-running operations are rejected with `Busy`.

pub mod error;
mod id_map;
pub mod lease;
pub mod portable_codec;
pub(crate) mod replay;
pub mod sync_engine;
pub mod version_manager;
pub mod workspace_service;

pub use error::{FailureKind, ServiceError};
pub use id_map::IdMap;
pub use lease::{LeaseGuard, LeaseScope, OperationLeases};
pub use portable_codec::{
    ImportResult, PortableCodec, PortableDocument, PORTABLE_FORMAT, PORTABLE_VERSION,
};
pub use replay::OrphanPolicy;
pub use sync_engine::{PullResult, SyncEngine, SyncResult, SyncStatus};
pub use version_manager::{KindDiff, RestoreResult, VersionDiff, VersionManager};
pub use workspace_service::{
    ConnectedNotes, DesktopContents, DesktopLevel, NewNote, WorkspaceService,
};
