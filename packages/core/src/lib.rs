//! DeskFlow Core Engine
//!
//! Local-first storage, synchronization, versioning and portable export for
//! DeskFlow workspaces: spatial canvases ("desktops") of notes, image assets,
//! folders that open nested desktops, and connections between notes.
//!
//! # Architecture
//!
//! - **Whole-state persistence**: the local state is one JSON document in an
//!   embedded libsql database, committed atomically per batch
//! - **Full-replace sync**: push and pull replace the other side's content;
//!   nothing is merged
//! - **Immutable versions**: numbered snapshots that restore under fresh ids
//! - **Portable documents**: subtree exports with their own local id space
//!
//! # Modules
//!
//! - [`models`] - Entities, snapshots and field validation
//! - [`db`] - Entity store, change journal and key-value backends
//! - [`remote`] - Remote store interface and an in-memory implementation
//! - [`services`] - Workspace editing, sync, versions and portable documents
//! - [`config`] - Engine configuration
//! - [`engine`] - Facade wiring everything to one store

pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod remote;
pub mod services;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::DeskflowEngine;
pub use models::*;
pub use services::*;
