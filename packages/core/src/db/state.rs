//! In-memory image of the persisted local state
//!
//! The whole local store (every entity table, the version history and the
//! change journal) is one serializable value. [`super::EntityStore`] loads it
//! once, mutates copies of it inside batches, and writes it back as a single
//! blob. Everything here is synchronous and side-effect free.

use crate::models::{
    Asset, Connection, Desktop, Entity, EntityCounts, EntityKind, Folder, Note, PendingChange,
    Version, Workspace, WorkspaceContent,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Layout version of the persisted state blob
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Entities removed by one cascading delete
pub type CascadeReport = EntityCounts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreState {
    pub schema_version: u32,

    /// Incremented on every committed batch
    #[serde(default)]
    pub revision: u64,

    #[serde(default)]
    pub workspaces: IndexMap<String, Workspace>,
    #[serde(default)]
    pub desktops: IndexMap<String, Desktop>,
    #[serde(default)]
    pub notes: IndexMap<String, Note>,
    #[serde(default)]
    pub assets: IndexMap<String, Asset>,
    #[serde(default)]
    pub folders: IndexMap<String, Folder>,
    #[serde(default)]
    pub connections: IndexMap<String, Connection>,
    #[serde(default)]
    pub versions: IndexMap<String, Version>,
    #[serde(default)]
    pub pending_changes: IndexMap<String, PendingChange>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            revision: 0,
            workspaces: IndexMap::new(),
            desktops: IndexMap::new(),
            notes: IndexMap::new(),
            assets: IndexMap::new(),
            folders: IndexMap::new(),
            connections: IndexMap::new(),
            versions: IndexMap::new(),
            pending_changes: IndexMap::new(),
        }
    }
}

impl StoreState {
    /// Insert or replace an entity, returning its id
    pub fn insert(&mut self, entity: Entity) -> String {
        let id = entity.id().to_string();
        match entity {
            Entity::Workspace(e) => {
                self.workspaces.insert(id.clone(), e);
            }
            Entity::Desktop(e) => {
                self.desktops.insert(id.clone(), e);
            }
            Entity::Note(e) => {
                self.notes.insert(id.clone(), e);
            }
            Entity::Asset(e) => {
                self.assets.insert(id.clone(), e);
            }
            Entity::Folder(e) => {
                self.folders.insert(id.clone(), e);
            }
            Entity::Connection(e) => {
                self.connections.insert(id.clone(), e);
            }
            Entity::Version(e) => {
                self.versions.insert(id.clone(), e);
            }
            Entity::PendingChange(e) => {
                self.pending_changes.insert(id.clone(), e);
            }
        }
        id
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        match kind {
            EntityKind::Workspace => self.workspaces.get(id).cloned().map(Entity::from),
            EntityKind::Desktop => self.desktops.get(id).cloned().map(Entity::from),
            EntityKind::Note => self.notes.get(id).cloned().map(Entity::from),
            EntityKind::Asset => self.assets.get(id).cloned().map(Entity::from),
            EntityKind::Folder => self.folders.get(id).cloned().map(Entity::from),
            EntityKind::Connection => self.connections.get(id).cloned().map(Entity::from),
            EntityKind::Version => self.versions.get(id).cloned().map(Entity::from),
            EntityKind::PendingChange => self.pending_changes.get(id).cloned().map(Entity::from),
        }
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Workspace => self.workspaces.contains_key(id),
            EntityKind::Desktop => self.desktops.contains_key(id),
            EntityKind::Note => self.notes.contains_key(id),
            EntityKind::Asset => self.assets.contains_key(id),
            EntityKind::Folder => self.folders.contains_key(id),
            EntityKind::Connection => self.connections.contains_key(id),
            EntityKind::Version => self.versions.contains_key(id),
            EntityKind::PendingChange => self.pending_changes.contains_key(id),
        }
    }

    /// Remove a single entity without cascading
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> Option<Entity> {
        match kind {
            EntityKind::Workspace => self.workspaces.shift_remove(id).map(Entity::from),
            EntityKind::Desktop => self.desktops.shift_remove(id).map(Entity::from),
            EntityKind::Note => self.notes.shift_remove(id).map(Entity::from),
            EntityKind::Asset => self.assets.shift_remove(id).map(Entity::from),
            EntityKind::Folder => self.folders.shift_remove(id).map(Entity::from),
            EntityKind::Connection => self.connections.shift_remove(id).map(Entity::from),
            EntityKind::Version => self.versions.shift_remove(id).map(Entity::from),
            EntityKind::PendingChange => self.pending_changes.shift_remove(id).map(Entity::from),
        }
    }

    /// List entities of one kind, optionally filtered by their owning key
    ///
    /// The owning key is the natural parent reference of each kind: owner for
    /// workspaces, workspace for desktops and versions, desktop for notes,
    /// folders and connections, note for assets, entity id for pending changes.
    pub fn list(&self, kind: EntityKind, owner: Option<&str>) -> Vec<Entity> {
        fn pick<'a, T: Clone + Into<Entity> + 'a>(
            values: impl Iterator<Item = &'a T>,
            owner: Option<&str>,
            key: impl Fn(&T) -> &str,
        ) -> Vec<Entity> {
            values
                .filter(|v| owner.map_or(true, |o| key(*v) == o))
                .cloned()
                .map(Into::into)
                .collect()
        }

        match kind {
            EntityKind::Workspace => pick(self.workspaces.values(), owner, |w| w.owner_id.as_str()),
            EntityKind::Desktop => pick(self.desktops.values(), owner, |d| d.workspace_id.as_str()),
            EntityKind::Note => pick(self.notes.values(), owner, |n| n.desktop_id.as_str()),
            EntityKind::Asset => pick(self.assets.values(), owner, |a| a.note_id.as_str()),
            EntityKind::Folder => pick(self.folders.values(), owner, |f| f.desktop_id.as_str()),
            EntityKind::Connection => pick(self.connections.values(), owner, |c| c.desktop_id.as_str()),
            EntityKind::Version => pick(self.versions.values(), owner, |v| v.workspace_id.as_str()),
            EntityKind::PendingChange => {
                pick(self.pending_changes.values(), owner, |p| p.entity_id.as_str())
            }
        }
    }

    pub fn child_desktops<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Desktop> {
        self.desktops
            .values()
            .filter(move |d| d.parent_id.as_deref() == Some(parent_id))
    }

    /// `root` followed by every parent-pointer descendant, depth-first pre-order
    ///
    /// Returns an empty list when `root` does not exist. A cycle in the parent
    /// pointers is cut at the first revisited desktop.
    pub fn desktop_subtree(&self, root: &str) -> Vec<String> {
        if !self.desktops.contains_key(root) {
            return Vec::new();
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root.to_string()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let children: Vec<String> = self.child_desktops(&id).map(|d| d.id.clone()).collect();
            order.push(id);
            stack.extend(children.into_iter().rev());
        }

        order
    }

    /// The desktop of `workspace_id` without a parent
    pub fn root_desktop(&self, workspace_id: &str) -> Option<&Desktop> {
        self.desktops
            .values()
            .find(|d| d.workspace_id == workspace_id && d.is_root())
    }

    pub fn max_version_number(&self, workspace_id: &str) -> i64 {
        self.versions
            .values()
            .filter(|v| v.workspace_id == workspace_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
    }

    /// Remove a note, its assets and every connection touching it
    pub fn remove_note_cascade(&mut self, note_id: &str) -> CascadeReport {
        let mut report = CascadeReport::default();
        if self.notes.shift_remove(note_id).is_none() {
            return report;
        }
        report.notes = 1;

        let before = self.assets.len();
        self.assets.retain(|_, a| a.note_id != note_id);
        report.assets = before - self.assets.len();

        let before = self.connections.len();
        self.connections.retain(|_, c| !c.touches(note_id));
        report.connections = before - self.connections.len();

        report
    }

    /// Remove a desktop subtree and everything it owns
    ///
    /// Besides the notes, assets, folders and connections of every removed
    /// desktop, folders elsewhere that target a removed desktop go too.
    pub fn remove_desktop_cascade(&mut self, desktop_id: &str) -> CascadeReport {
        let subtree: HashSet<String> = self.desktop_subtree(desktop_id).into_iter().collect();
        let mut report = CascadeReport::default();
        if subtree.is_empty() {
            return report;
        }

        let doomed_notes: HashSet<String> = self
            .notes
            .values()
            .filter(|n| subtree.contains(&n.desktop_id))
            .map(|n| n.id.clone())
            .collect();

        let before = self.assets.len();
        self.assets.retain(|_, a| !doomed_notes.contains(&a.note_id));
        report.assets = before - self.assets.len();

        let before = self.connections.len();
        self.connections.retain(|_, c| {
            !subtree.contains(&c.desktop_id)
                && !doomed_notes.contains(&c.from_note_id)
                && !doomed_notes.contains(&c.to_note_id)
        });
        report.connections = before - self.connections.len();

        let before = self.notes.len();
        self.notes.retain(|id, _| !doomed_notes.contains(id));
        report.notes = before - self.notes.len();

        let before = self.folders.len();
        self.folders.retain(|_, f| {
            !subtree.contains(&f.desktop_id) && !subtree.contains(&f.target_desktop_id)
        });
        report.folders = before - self.folders.len();

        let before = self.desktops.len();
        self.desktops.retain(|id, _| !subtree.contains(id));
        report.desktops = before - self.desktops.len();

        report
    }

    /// Remove a folder and the desktop subtree it targets
    pub fn remove_folder_cascade(&mut self, folder_id: &str) -> CascadeReport {
        let Some(folder) = self.folders.shift_remove(folder_id) else {
            return CascadeReport::default();
        };
        let mut report = self.remove_desktop_cascade(&folder.target_desktop_id);
        report.folders += 1;
        report
    }

    /// Everything owned by a workspace, in store order
    pub fn workspace_content(&self, workspace_id: &str) -> WorkspaceContent {
        let desktop_ids: Vec<String> = self
            .desktops
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .map(|d| d.id.clone())
            .collect();
        self.content_of(&desktop_ids)
    }

    /// Everything owned by a desktop subtree, desktops in depth-first pre-order
    pub fn subtree_content(&self, root_id: &str) -> WorkspaceContent {
        self.content_of(&self.desktop_subtree(root_id))
    }

    fn content_of(&self, desktop_ids: &[String]) -> WorkspaceContent {
        let members: HashSet<&str> = desktop_ids.iter().map(String::as_str).collect();

        let desktops = desktop_ids
            .iter()
            .filter_map(|id| self.desktops.get(id).cloned())
            .collect();
        let notes: Vec<Note> = self
            .notes
            .values()
            .filter(|n| members.contains(n.desktop_id.as_str()))
            .cloned()
            .collect();
        let note_ids: HashSet<&str> = notes.iter().map(|n| n.id.as_str()).collect();
        let assets = self
            .assets
            .values()
            .filter(|a| note_ids.contains(a.note_id.as_str()))
            .cloned()
            .collect();
        let folders = self
            .folders
            .values()
            .filter(|f| members.contains(f.desktop_id.as_str()))
            .cloned()
            .collect();
        let connections = self
            .connections
            .values()
            .filter(|c| members.contains(c.desktop_id.as_str()))
            .cloned()
            .collect();

        WorkspaceContent {
            desktops,
            notes,
            assets,
            folders,
            connections,
        }
    }

    /// Drop every workspace and its content; versions and journal stay
    pub fn clear_content(&mut self) {
        self.workspaces.clear();
        self.desktops.clear();
        self.notes.clear();
        self.assets.clear();
        self.folders.clear();
        self.connections.clear();
    }

    /// Insert a full content capture (ids taken as given)
    pub fn insert_content(&mut self, content: WorkspaceContent) {
        for d in content.desktops {
            self.desktops.insert(d.id.clone(), d);
        }
        for n in content.notes {
            self.notes.insert(n.id.clone(), n);
        }
        for a in content.assets {
            self.assets.insert(a.id.clone(), a);
        }
        for f in content.folders {
            self.folders.insert(f.id.clone(), f);
        }
        for c in content.connections {
            self.connections.insert(c.id.clone(), c);
        }
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            desktops: self.desktops.len(),
            notes: self.notes.len(),
            assets: self.assets.len(),
            folders: self.folders.len(),
            connections: self.connections.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    fn desktop(state: &mut StoreState, ws: &str, parent: Option<&str>, name: &str) -> String {
        state.insert(Desktop::new(ws, parent.map(String::from), name).into())
    }

    fn note(state: &mut StoreState, desktop_id: &str, title: &str) -> String {
        state.insert(Note::new(desktop_id, title, Position::new(0.0, 0.0)).into())
    }

    #[test]
    fn test_subtree_is_preorder_and_survives_cycles() {
        let mut state = StoreState::default();
        let root = desktop(&mut state, "ws", None, "root");
        let a = desktop(&mut state, "ws", Some(&root), "a");
        let a1 = desktop(&mut state, "ws", Some(&a), "a1");
        let b = desktop(&mut state, "ws", Some(&root), "b");

        assert_eq!(state.desktop_subtree(&root), vec![root.clone(), a.clone(), a1, b]);
        assert!(state.desktop_subtree("missing").is_empty());

        // root -> a -> root
        state.desktops.get_mut(&root).unwrap().parent_id = Some(a.clone());
        assert_eq!(state.desktop_subtree(&a).len(), 4);
    }

    #[test]
    fn test_note_cascade_removes_assets_and_connections() {
        let mut state = StoreState::default();
        let d = desktop(&mut state, "ws", None, "root");
        let n1 = note(&mut state, &d, "n1");
        let n2 = note(&mut state, &d, "n2");
        state.insert(Asset::new(n1.clone(), vec![1, 2, 3], "image/png").into());
        state.insert(Connection::new(d.clone(), n1.clone(), n2.clone()).into());

        let report = state.remove_note_cascade(&n1);
        assert_eq!(report.notes, 1);
        assert_eq!(report.assets, 1);
        assert_eq!(report.connections, 1);
        assert!(state.notes.contains_key(&n2));
        assert_eq!(state.remove_note_cascade(&n1), CascadeReport::default());
    }

    #[test]
    fn test_desktop_cascade_drops_inbound_folders() {
        let mut state = StoreState::default();
        let root = desktop(&mut state, "ws", None, "root");
        let child = desktop(&mut state, "ws", Some(&root), "child");
        let grandchild = desktop(&mut state, "ws", Some(&child), "grandchild");
        note(&mut state, &grandchild, "deep");
        state.insert(Folder::new(root.clone(), child.clone(), "to child", Position::default()).into());
        state.insert(
            Folder::new(root.clone(), grandchild.clone(), "to grandchild", Position::default())
                .into(),
        );

        let report = state.remove_desktop_cascade(&child);
        assert_eq!(report.desktops, 2);
        assert_eq!(report.notes, 1);
        assert_eq!(report.folders, 2);
        assert_eq!(state.desktops.len(), 1);
        assert!(state.folders.is_empty());
    }

    #[test]
    fn test_workspace_content_is_scoped() {
        let mut state = StoreState::default();
        let mine = desktop(&mut state, "ws-1", None, "mine");
        let theirs = desktop(&mut state, "ws-2", None, "theirs");
        note(&mut state, &mine, "a");
        note(&mut state, &theirs, "b");

        let content = state.workspace_content("ws-1");
        assert_eq!(content.desktops.len(), 1);
        assert_eq!(content.notes.len(), 1);
        assert_eq!(content.notes[0].title, "a");
    }

    #[test]
    fn test_state_blob_rejects_unknown_fields() {
        let json = r#"{"schemaVersion":1,"widgets":{}}"#;
        assert!(serde_json::from_str::<StoreState>(json).is_err());
    }
}
