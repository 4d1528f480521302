//! Change Journal
//!
//! Coalesced log of outstanding local mutations. There is at most one
//! [`PendingChange`] per entity id: recording a change first drops any earlier
//! row for the same entity, so create-then-delete before a push collapses to a
//! single delete.
//!
//! Cascades journal every entity they take out, and imports journal every
//! entity they create, not only the one the caller named.

use crate::db::state::StoreState;
use crate::db::{EntityStore, StoreError};
use crate::models::{ChangeKind, EntityKind, PendingChange, WorkspaceContent};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChangeJournal {
    store: Arc<EntityStore>,
}

impl ChangeJournal {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Stage a change inside an enclosing [`EntityStore::batch`]
    pub fn stage(state: &mut StoreState, change: PendingChange) {
        state
            .pending_changes
            .retain(|_, existing| existing.entity_id != change.entity_id);
        state.pending_changes.insert(change.id.clone(), change);
    }

    /// Run a cascading removal and stage a delete for every entity it removed
    pub fn stage_removals<R>(state: &mut StoreState, remove: impl FnOnce(&mut StoreState) -> R) -> R {
        let before = content_keys(state);
        let removed = remove(state);
        for (kind, id) in before {
            if !state.contains(kind, &id) {
                Self::stage(state, PendingChange::new(ChangeKind::Delete, kind, id, None));
            }
        }
        removed
    }

    /// Stage a create for every entity in freshly inserted content
    pub fn stage_creates(state: &mut StoreState, content: &WorkspaceContent) {
        let created = content
            .desktops
            .iter()
            .map(|d| (EntityKind::Desktop, &d.id))
            .chain(content.notes.iter().map(|n| (EntityKind::Note, &n.id)))
            .chain(content.assets.iter().map(|a| (EntityKind::Asset, &a.id)))
            .chain(content.folders.iter().map(|f| (EntityKind::Folder, &f.id)))
            .chain(content.connections.iter().map(|c| (EntityKind::Connection, &c.id)));
        for (kind, id) in created {
            Self::stage(state, PendingChange::new(ChangeKind::Create, kind, id.as_str(), None));
        }
    }

    pub async fn record(
        &self,
        kind: ChangeKind,
        entity_type: EntityKind,
        entity_id: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<PendingChange, StoreError> {
        let change = PendingChange::new(kind, entity_type, entity_id, payload);
        let recorded = change.clone();
        self.store
            .batch(|s| {
                Self::stage(s, change);
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(recorded)
    }

    /// Pending changes, oldest first
    pub async fn list(&self) -> Vec<PendingChange> {
        let mut changes: Vec<PendingChange> = self
            .store
            .read(|s| s.pending_changes.values().cloned().collect())
            .await;
        changes.sort_by_key(|c| c.timestamp);
        changes
    }

    /// The pending change for one entity, if any
    pub async fn get(&self, entity_id: &str) -> Option<PendingChange> {
        self.store
            .read(|s| {
                s.pending_changes
                    .values()
                    .find(|c| c.entity_id == entity_id)
                    .cloned()
            })
            .await
    }

    pub async fn len(&self) -> usize {
        self.store.read(|s| s.pending_changes.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every pending change, returning how many there were
    pub async fn clear(&self) -> Result<usize, StoreError> {
        self.store
            .batch(|s| {
                let cleared = s.pending_changes.len();
                s.pending_changes.clear();
                Ok::<_, StoreError>(cleared)
            })
            .await
    }
}

fn content_keys(state: &StoreState) -> Vec<(EntityKind, String)> {
    let mut keys = Vec::new();
    keys.extend(state.desktops.keys().map(|id| (EntityKind::Desktop, id.clone())));
    keys.extend(state.notes.keys().map(|id| (EntityKind::Note, id.clone())));
    keys.extend(state.assets.keys().map(|id| (EntityKind::Asset, id.clone())));
    keys.extend(state.folders.keys().map(|id| (EntityKind::Folder, id.clone())));
    keys.extend(state.connections.keys().map(|id| (EntityKind::Connection, id.clone())));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_update_delete_coalesces_to_delete() {
        let journal = ChangeJournal::new(Arc::new(EntityStore::in_memory()));

        journal.record(ChangeKind::Create, EntityKind::Note, "n1", None).await.unwrap();
        journal
            .record(
                ChangeKind::Update,
                EntityKind::Note,
                "n1",
                Some(serde_json::json!({"title": "renamed"})),
            )
            .await
            .unwrap();
        journal.record(ChangeKind::Delete, EntityKind::Note, "n1", None).await.unwrap();
        journal.record(ChangeKind::Create, EntityKind::Note, "n2", None).await.unwrap();

        assert_eq!(journal.len().await, 2);
        let n1 = journal.get("n1").await.unwrap();
        assert_eq!(n1.kind, ChangeKind::Delete);
        assert_eq!(n1.payload, None);
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_clear_empties() {
        let journal = ChangeJournal::new(Arc::new(EntityStore::in_memory()));
        for id in ["a", "b", "c"] {
            journal.record(ChangeKind::Create, EntityKind::Desktop, id, None).await.unwrap();
        }

        let ids: Vec<String> = journal.list().await.into_iter().map(|c| c.entity_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert_eq!(journal.clear().await.unwrap(), 3);
        assert!(journal.is_empty().await);
    }
}
