//! Store Events
//!
//! Emitted by [`super::EntityStore`] after a batch commits, on a tokio broadcast
//! channel so several collaborators (UI bridges, the dev tools, tests) can
//! follow changes without coupling to the store.
//!
//! Events are only sent for committed state; a batch that fails to persist
//! emits nothing.

use crate::models::{EntityCounts, EntityKind};

/// Why the whole store content was replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    Pull,
    Restore,
    Import,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// An entity was created or updated
    EntityPut { kind: EntityKind, id: String },

    /// An entity was deleted; `removed` counts everything its cascade took with it
    EntityDeleted {
        kind: EntityKind,
        id: String,
        removed: EntityCounts,
    },

    /// Content was replaced wholesale; in-memory views must reload
    Reloaded { reason: ReloadReason },
}

impl StoreEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::EntityPut { .. } => "entity_put",
            StoreEvent::EntityDeleted { .. } => "entity_deleted",
            StoreEvent::Reloaded { .. } => "reloaded",
        }
    }
}
