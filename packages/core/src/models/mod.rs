//! Data Models
//!
//! Entities of a DeskFlow workspace and the documents built from them:
//!
//! - `Workspace`, `Desktop`, `Note`, `Asset`, `Folder`, `Connection` - the
//!   workspace graph
//! - `Version`, `PendingChange` - history and the outstanding-change journal
//! - `WorkspaceContent`, `WorkspaceSnapshot` - full-content captures
//! - `Entity` / `EntityKind` - the tagged envelope used by the generic store API

mod asset;
pub(crate) mod binary;
mod change;
mod connection;
mod content;
mod desktop;
mod entity;
mod folder;
mod geometry;
mod note;
pub mod validation;
mod version;
mod workspace;

pub use asset::Asset;
pub use change::{ChangeKind, PendingChange};
pub use connection::{Connection, DEFAULT_CONNECTION_COLOR};
pub use content::{
    ContentIds, EntityCounts, SkipCounts, WorkspaceContent, WorkspaceHeader, WorkspaceSnapshot,
};
pub use desktop::Desktop;
pub use entity::{Entity, EntityKind};
pub use folder::Folder;
pub use geometry::{Position, Size};
pub use note::{Note, NoteUpdate};
pub use validation::ValidationError;
pub use version::Version;
pub use workspace::{ThemeConfig, Workspace};
