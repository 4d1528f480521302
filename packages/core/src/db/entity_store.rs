//! Entity Store
//!
//! Keyed repository for every entity kind, backed by a single state blob in a
//! [`KeyValueBackend`].
//!
//! # Consistency
//!
//! All writes go through [`EntityStore::batch`]: the closure mutates a staged
//! copy of the state, the copy is persisted under [`STATE_KEY`] in one `put`,
//! and only then does it replace the in-memory state. A failure anywhere in the
//! closure or in the backend write leaves both the persisted blob and the
//! in-memory state exactly as they were, so multi-entity operations (cascading
//! deletes, content replacement, imports) are all-or-nothing.
//!
//! Readers never observe a half-applied batch: the write lock is held from
//! staging until the swap.
//!
//! # Events
//!
//! The store does not emit events from inside `batch`. The convenience methods
//! below (`put`, `delete`, `replace_content`, ...) emit after commit; services
//! that use `batch` directly call [`EntityStore::notify`] themselves.

use crate::db::events::{ReloadReason, StoreEvent};
use crate::db::kv::{KeyValueBackend, MemoryKv};
use crate::db::state::{CascadeReport, StoreState, STATE_SCHEMA_VERSION};
use crate::db::StoreError;
use crate::models::{
    Asset, Connection, Desktop, Entity, EntityKind, Folder, Note, Version, Workspace,
    WorkspaceContent,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Key under which the whole local state is persisted
pub const STATE_KEY: &str = "deskflow/state";

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct EntityStore {
    backend: Arc<dyn KeyValueBackend>,
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl EntityStore {
    /// Load the persisted state from `backend`, or start empty
    ///
    /// # Errors
    ///
    /// - Backend read fails
    /// - The blob is not valid JSON for this layout
    /// - The blob was written by a different state schema version
    pub async fn open(backend: Arc<dyn KeyValueBackend>) -> Result<Self, StoreError> {
        let state = match backend.get(STATE_KEY).await? {
            Some(bytes) => {
                let state: StoreState = serde_json::from_slice(&bytes)?;
                if state.schema_version != STATE_SCHEMA_VERSION {
                    return Err(StoreError::CorruptState(format!(
                        "state schema version {} is not supported (expected {})",
                        state.schema_version, STATE_SCHEMA_VERSION
                    )));
                }
                state
            }
            None => StoreState::default(),
        };

        tracing::debug!(
            revision = state.revision,
            workspaces = state.workspaces.len(),
            "Opened entity store"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            backend,
            state: RwLock::new(state),
            events,
        })
    }

    /// Empty store on a fresh [`MemoryKv`]
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend: Arc::new(MemoryKv::new()),
            state: RwLock::new(StoreState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Broadcast an event; having no subscribers is not an error
    pub fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// Run a read-only closure against the current state
    pub async fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Clone of the current state
    pub async fn state(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    /// Stage mutations on a copy of the state and commit them with one write
    ///
    /// If `f` returns an error, or the backend write fails, nothing changes.
    pub async fn batch<R, E>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.state.write().await;
        let mut staged = guard.clone();

        let output = f(&mut staged)?;
        staged.revision += 1;

        let bytes = serde_json::to_vec(&staged).map_err(StoreError::from)?;
        self.backend.put(STATE_KEY, bytes).await?;

        *guard = staged;
        Ok(output)
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Entity, StoreError> {
        self.read(|s| s.get(kind, id))
            .await
            .ok_or_else(|| StoreError::not_found(kind, id))
    }

    pub async fn workspace(&self, id: &str) -> Option<Workspace> {
        self.read(|s| s.workspaces.get(id).cloned()).await
    }

    pub async fn desktop(&self, id: &str) -> Option<Desktop> {
        self.read(|s| s.desktops.get(id).cloned()).await
    }

    pub async fn note(&self, id: &str) -> Option<Note> {
        self.read(|s| s.notes.get(id).cloned()).await
    }

    pub async fn asset(&self, id: &str) -> Option<Asset> {
        self.read(|s| s.assets.get(id).cloned()).await
    }

    pub async fn folder(&self, id: &str) -> Option<Folder> {
        self.read(|s| s.folders.get(id).cloned()).await
    }

    pub async fn connection(&self, id: &str) -> Option<Connection> {
        self.read(|s| s.connections.get(id).cloned()).await
    }

    pub async fn version(&self, id: &str) -> Option<Version> {
        self.read(|s| s.versions.get(id).cloned()).await
    }

    /// See [`StoreState::list`] for what `owner` filters on
    pub async fn list(&self, kind: EntityKind, owner: Option<&str>) -> Vec<Entity> {
        self.read(|s| s.list(kind, owner)).await
    }

    pub async fn put(&self, entity: Entity) -> Result<String, StoreError> {
        let kind = entity.kind();
        let id = self
            .batch(|s| Ok::<_, StoreError>(s.insert(entity)))
            .await?;
        self.notify(StoreEvent::EntityPut {
            kind,
            id: id.clone(),
        });
        Ok(id)
    }

    /// Delete one entity; desktops, notes, folders and workspaces cascade
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<CascadeReport, StoreError> {
        let removed = self
            .batch(|s| {
                if !s.contains(kind, id) {
                    return Err(StoreError::not_found(kind, id));
                }
                Ok(match kind {
                    EntityKind::Desktop => s.remove_desktop_cascade(id),
                    EntityKind::Note => s.remove_note_cascade(id),
                    EntityKind::Folder => s.remove_folder_cascade(id),
                    EntityKind::Workspace => {
                        let roots: Vec<String> = s
                            .desktops
                            .values()
                            .filter(|d| d.workspace_id == id)
                            .map(|d| d.id.clone())
                            .collect();
                        let mut report = CascadeReport::default();
                        for root in roots {
                            let r = s.remove_desktop_cascade(&root);
                            report.desktops += r.desktops;
                            report.notes += r.notes;
                            report.assets += r.assets;
                            report.folders += r.folders;
                            report.connections += r.connections;
                        }
                        s.remove(kind, id);
                        report
                    }
                    _ => {
                        s.remove(kind, id);
                        CascadeReport::default()
                    }
                })
            })
            .await?;

        tracing::debug!(%kind, id, %removed, "Deleted entity");
        self.notify(StoreEvent::EntityDeleted {
            kind,
            id: id.to_string(),
            removed,
        });
        Ok(removed)
    }

    pub async fn delete_desktop_cascade(&self, id: &str) -> Result<CascadeReport, StoreError> {
        self.delete(EntityKind::Desktop, id).await
    }

    pub async fn delete_note_cascade(&self, id: &str) -> Result<CascadeReport, StoreError> {
        self.delete(EntityKind::Note, id).await
    }

    pub async fn delete_folder_cascade(&self, id: &str) -> Result<CascadeReport, StoreError> {
        self.delete(EntityKind::Folder, id).await
    }

    pub async fn workspace_content(&self, workspace_id: &str) -> WorkspaceContent {
        self.read(|s| s.workspace_content(workspace_id)).await
    }

    pub async fn subtree_content(&self, root_desktop_id: &str) -> WorkspaceContent {
        self.read(|s| s.subtree_content(root_desktop_id)).await
    }

    /// Replace all workspaces and their content with one workspace
    ///
    /// The change journal is emptied with the old content; versions are kept.
    pub async fn replace_content(
        &self,
        workspace: Workspace,
        content: WorkspaceContent,
        reason: ReloadReason,
    ) -> Result<(), StoreError> {
        self.batch(|s| {
            s.clear_content();
            s.pending_changes.clear();
            s.insert(workspace.into());
            s.insert_content(content);
            Ok::<_, StoreError>(())
        })
        .await?;
        self.notify(StoreEvent::Reloaded { reason });
        Ok(())
    }

    /// Remove every workspace, its content and the journal; versions are kept
    pub async fn wipe_content(&self, reason: ReloadReason) -> Result<(), StoreError> {
        self.batch(|s| {
            s.clear_content();
            s.pending_changes.clear();
            Ok::<_, StoreError>(())
        })
        .await?;
        self.notify(StoreEvent::Reloaded { reason });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[tokio::test]
    async fn test_put_get_and_not_found() {
        let store = EntityStore::in_memory();
        let ws = Workspace::new("user-1", "Main");
        let id = store.put(ws.clone().into()).await.unwrap();

        assert_eq!(store.get(EntityKind::Workspace, &id).await.unwrap(), Entity::from(ws));
        let err = store.get(EntityKind::Desktop, &id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete(EntityKind::Note, "missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryKv::new());
        let store = EntityStore::open(backend.clone()).await.unwrap();
        let desktop = Desktop::new("ws", None, "root");
        store.put(desktop.clone().into()).await.unwrap();

        let reopened = EntityStore::open(backend).await.unwrap();
        assert_eq!(reopened.desktop(&desktop.id).await, Some(desktop));
        assert_eq!(reopened.revision().await, 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let backend = Arc::new(MemoryKv::new());
        let store = EntityStore::open(backend.clone()).await.unwrap();
        let root = Desktop::new("ws", None, "root");
        store.put(root.clone().into()).await.unwrap();
        let note = Note::new(root.id.clone(), "n1", Position::new(100.0, 100.0));
        store.put(note.clone().into()).await.unwrap();

        backend.set_fail_writes(true);
        assert!(store.delete_desktop_cascade(&root.id).await.is_err());

        assert!(store.desktop(&root.id).await.is_some());
        assert!(store.note(&note.id).await.is_some());
    }

    #[tokio::test]
    async fn test_batch_error_discards_staged_changes() {
        let store = EntityStore::in_memory();
        let result = store
            .batch(|s| {
                s.insert(Desktop::new("ws", None, "root").into());
                Err::<(), _>(StoreError::backend("abort"))
            })
            .await;

        assert!(result.is_err());
        assert!(store.list(EntityKind::Desktop, None).await.is_empty());
        assert_eq!(store.revision().await, 0);
    }

    #[tokio::test]
    async fn test_delete_emits_event_with_cascade_counts() {
        let store = EntityStore::in_memory();
        let mut events = store.subscribe();
        let root = Desktop::new("ws", None, "root");
        store.put(root.clone().into()).await.unwrap();
        store
            .put(Note::new(root.id.clone(), "n1", Position::default()).into())
            .await
            .unwrap();

        store.delete_desktop_cascade(&root.id).await.unwrap();

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        match last {
            Some(StoreEvent::EntityDeleted { kind, removed, .. }) => {
                assert_eq!(kind, EntityKind::Desktop);
                assert_eq!(removed.desktops, 1);
                assert_eq!(removed.notes, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
