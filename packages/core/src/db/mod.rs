//! Local Persistence Layer
//!
//! - [`KeyValueBackend`] - bytes-by-key seam, with [`MemoryKv`] and the
//!   embedded [`LibsqlKv`] implementations
//! - [`StoreState`] - every entity table as one serializable value
//! - [`EntityStore`] - keyed repository with batched, all-or-nothing commits
//! - [`ChangeJournal`] - coalesced pending-change log
//! - [`StoreEvent`] - broadcast notifications after commits

mod entity_store;
mod error;
pub mod events;
mod journal;
mod kv;
mod libsql_kv;
mod state;

pub use entity_store::{EntityStore, STATE_KEY};
pub use error::StoreError;
pub use events::{ReloadReason, StoreEvent};
pub use journal::ChangeJournal;
pub use kv::{KeyValueBackend, MemoryKv};
pub use libsql_kv::LibsqlKv;
pub use state::{CascadeReport, StoreState, STATE_SCHEMA_VERSION};
