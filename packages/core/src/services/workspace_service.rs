//! Workspace Service
//!
//! Day-to-day editing of a workspace: desktops, notes, assets, folders and
//! connections, plus the read-side queries the canvas needs (hierarchy,
//! contents, search, recent notes, connection graph).
//!
//! Every mutation commits in a single store batch together with its Change
//! Journal entry, so the journal never disagrees with the entity tables.

use crate::config::EngineConfig;
use crate::db::{CascadeReport, ChangeJournal, EntityStore, StoreEvent, StoreState};
use crate::models::validation::{self, MAX_CONTENT_LEN, MAX_NAME_LEN, MAX_TITLE_LEN};
use crate::models::{
    Asset, ChangeKind, Connection, Desktop, EntityCounts, EntityKind, Folder, Note, NoteUpdate,
    PendingChange, Position, ThemeConfig, ValidationError, Workspace,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ServiceError;

/// Name given to the root desktop of a new workspace
pub const ROOT_DESKTOP_NAME: &str = "Main Desktop";

/// Default depth limit for [`WorkspaceService::desktop_hierarchy`]
pub const DEFAULT_HIERARCHY_DEPTH: usize = 10;

/// Default canvas offset applied by [`WorkspaceService::duplicate_note`]
pub const DUPLICATE_OFFSET: f64 = 30.0;

/// A desktop and its distance from the workspace root
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesktopLevel {
    pub desktop: Desktop,
    pub level: usize,
}

/// Everything drawn on one desktop canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesktopContents {
    pub desktop: Desktop,
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
    pub connections: Vec<Connection>,
    pub child_desktops: Vec<Desktop>,
    pub counts: EntityCounts,
}

/// Notes reachable from a starting note through connections
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNotes {
    pub notes: Vec<Note>,
    pub connections: Vec<Connection>,
}

/// Input for [`WorkspaceService::create_note`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub position: Position,
    pub color: Option<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, position: Position) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            position,
            color: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

fn stage(
    s: &mut StoreState,
    kind: ChangeKind,
    entity_type: EntityKind,
    id: &str,
    payload: Option<serde_json::Value>,
) {
    ChangeJournal::stage(s, PendingChange::new(kind, entity_type, id, payload));
}

pub struct WorkspaceService {
    store: Arc<EntityStore>,
    max_asset_bytes: usize,
}

impl WorkspaceService {
    pub fn new(store: Arc<EntityStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            max_asset_bytes: config.max_asset_bytes,
        }
    }

    fn put_event(&self, kind: EntityKind, id: &str) {
        self.store.notify(StoreEvent::EntityPut {
            kind,
            id: id.to_string(),
        });
    }

    fn deleted_event(&self, kind: EntityKind, id: &str, removed: CascadeReport) {
        self.store.notify(StoreEvent::EntityDeleted {
            kind,
            id: id.to_string(),
            removed,
        });
    }

    // =========================================================================
    // Workspaces
    // =========================================================================

    /// Create a workspace together with its root desktop
    pub async fn create_workspace(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<(Workspace, Desktop), ServiceError> {
        let name = validation::required_text("name", name, MAX_NAME_LEN)?;
        let workspace = Workspace::new(owner_id, name);
        let root = Desktop::new(workspace.id.clone(), None, ROOT_DESKTOP_NAME);

        let (workspace, root) = self
            .store
            .batch(|s| {
                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Workspace,
                    &workspace.id,
                    Some(serde_json::to_value(&workspace)?),
                );
                stage(s, ChangeKind::Create, EntityKind::Desktop, &root.id, None);
                s.insert(workspace.clone().into());
                s.insert(root.clone().into());
                Ok::<_, ServiceError>((workspace, root))
            })
            .await?;

        info!(workspace_id = %workspace.id, root_desktop_id = %root.id, "Created workspace");
        self.put_event(EntityKind::Workspace, &workspace.id);
        self.put_event(EntityKind::Desktop, &root.id);
        Ok((workspace, root))
    }

    pub async fn update_theme(
        &self,
        workspace_id: &str,
        theme: ThemeConfig,
    ) -> Result<Workspace, ServiceError> {
        validation::color(Some(&theme.primary_color))?;
        if !(0.0..=1.0).contains(&theme.glow_intensity) {
            return Err(ServiceError::malformed(format!(
                "glow intensity {} is outside 0.0..=1.0",
                theme.glow_intensity
            )));
        }
        self.modify_workspace(workspace_id, |w| w.theme_config = theme)
            .await
    }

    pub async fn rename_workspace(
        &self,
        workspace_id: &str,
        name: &str,
    ) -> Result<Workspace, ServiceError> {
        let name = validation::required_text("name", name, MAX_NAME_LEN)?;
        self.modify_workspace(workspace_id, |w| w.name = name).await
    }

    async fn modify_workspace(
        &self,
        workspace_id: &str,
        f: impl FnOnce(&mut Workspace),
    ) -> Result<Workspace, ServiceError> {
        let workspace = self
            .store
            .batch(|s| {
                let workspace = s
                    .workspaces
                    .get_mut(workspace_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Workspace, workspace_id))?;
                f(workspace);
                workspace.updated_at = Utc::now();
                let workspace = workspace.clone();
                stage(
                    s,
                    ChangeKind::Update,
                    EntityKind::Workspace,
                    workspace_id,
                    Some(serde_json::to_value(&workspace)?),
                );
                Ok::<_, ServiceError>(workspace)
            })
            .await?;
        self.put_event(EntityKind::Workspace, workspace_id);
        Ok(workspace)
    }

    // =========================================================================
    // Desktops
    // =========================================================================

    /// Create a desktop; `parent_id: None` creates the workspace root
    ///
    /// A workspace holds exactly one root desktop, so a second root is
    /// rejected. The new desktop is ordered after its siblings.
    pub async fn create_desktop(
        &self,
        workspace_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Desktop, ServiceError> {
        let name = validation::required_text("name", name, MAX_NAME_LEN)?;

        let desktop = self
            .store
            .batch(|s| {
                if !s.workspaces.contains_key(workspace_id) {
                    return Err(ServiceError::not_found(EntityKind::Workspace, workspace_id));
                }
                match parent_id {
                    Some(parent_id) => {
                        let parent = s.desktops.get(parent_id).ok_or_else(|| {
                            ServiceError::not_found(EntityKind::Desktop, parent_id)
                        })?;
                        if parent.workspace_id != workspace_id {
                            return Err(ServiceError::hierarchy(format!(
                                "parent desktop {} belongs to another workspace",
                                parent_id
                            )));
                        }
                    }
                    None => {
                        if s.root_desktop(workspace_id).is_some() {
                            return Err(ServiceError::hierarchy(format!(
                                "workspace {} already has a root desktop",
                                workspace_id
                            )));
                        }
                    }
                }

                let mut desktop = Desktop::new(workspace_id, parent_id.map(str::to_string), name);
                desktop.position_order = s
                    .desktops
                    .values()
                    .filter(|d| d.workspace_id == workspace_id && d.parent_id.as_deref() == parent_id)
                    .map(|d| d.position_order)
                    .max()
                    .map_or(0, |max| max + 1);

                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Desktop,
                    &desktop.id,
                    Some(serde_json::to_value(&desktop)?),
                );
                s.insert(desktop.clone().into());
                Ok(desktop)
            })
            .await?;

        debug!(desktop_id = %desktop.id, workspace_id, "Created desktop");
        self.put_event(EntityKind::Desktop, &desktop.id);
        Ok(desktop)
    }

    pub async fn rename_desktop(&self, desktop_id: &str, name: &str) -> Result<Desktop, ServiceError> {
        let name = validation::required_text("name", name, MAX_NAME_LEN)?;
        let desktop = self
            .store
            .batch(|s| {
                let desktop = s
                    .desktops
                    .get_mut(desktop_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Desktop, desktop_id))?;
                desktop.name = name;
                let desktop = desktop.clone();
                stage(
                    s,
                    ChangeKind::Update,
                    EntityKind::Desktop,
                    desktop_id,
                    Some(serde_json::to_value(&desktop)?),
                );
                Ok::<_, ServiceError>(desktop)
            })
            .await?;
        self.put_event(EntityKind::Desktop, desktop_id);
        Ok(desktop)
    }

    /// Desktops of a workspace in tree order, each with its depth below the root
    ///
    /// Desktops deeper than `max_depth` are left out.
    pub async fn desktop_hierarchy(
        &self,
        workspace_id: &str,
        max_depth: Option<usize>,
    ) -> Result<Vec<DesktopLevel>, ServiceError> {
        let max_depth = max_depth.unwrap_or(DEFAULT_HIERARCHY_DEPTH);
        self.store
            .read(|s| {
                if !s.workspaces.contains_key(workspace_id) {
                    return Err(ServiceError::not_found(EntityKind::Workspace, workspace_id));
                }
                let mut levels = Vec::new();
                let mut visited = HashSet::new();
                let mut stack: Vec<(&Desktop, usize)> = s
                    .desktops
                    .values()
                    .filter(|d| d.workspace_id == workspace_id && d.is_root())
                    .map(|d| (d, 0))
                    .collect();

                while let Some((desktop, level)) = stack.pop() {
                    if level > max_depth || !visited.insert(desktop.id.as_str()) {
                        continue;
                    }
                    let mut children: Vec<&Desktop> = s.child_desktops(&desktop.id).collect();
                    children.sort_by_key(|d| std::cmp::Reverse(d.position_order));
                    stack.extend(children.into_iter().map(|d| (d, level + 1)));
                    levels.push(DesktopLevel {
                        desktop: desktop.clone(),
                        level,
                    });
                }
                Ok(levels)
            })
            .await
    }

    pub async fn desktop_contents(&self, desktop_id: &str) -> Result<DesktopContents, ServiceError> {
        self.store
            .read(|s| {
                let desktop = s
                    .desktops
                    .get(desktop_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Desktop, desktop_id))?;

                let mut notes: Vec<Note> = s
                    .notes
                    .values()
                    .filter(|n| n.desktop_id == desktop_id)
                    .cloned()
                    .collect();
                notes.sort_by_key(|n| n.z_index);
                let note_ids: HashSet<&str> = notes.iter().map(|n| n.id.as_str()).collect();

                let folders: Vec<Folder> = s
                    .folders
                    .values()
                    .filter(|f| f.desktop_id == desktop_id)
                    .cloned()
                    .collect();
                let connections: Vec<Connection> = s
                    .connections
                    .values()
                    .filter(|c| c.desktop_id == desktop_id)
                    .cloned()
                    .collect();
                let mut child_desktops: Vec<Desktop> =
                    s.child_desktops(desktop_id).cloned().collect();
                child_desktops.sort_by_key(|d| d.position_order);

                let counts = EntityCounts {
                    desktops: child_desktops.len(),
                    notes: notes.len(),
                    assets: s
                        .assets
                        .values()
                        .filter(|a| note_ids.contains(a.note_id.as_str()))
                        .count(),
                    folders: folders.len(),
                    connections: connections.len(),
                };

                Ok(DesktopContents {
                    desktop: desktop.clone(),
                    notes,
                    folders,
                    connections,
                    child_desktops,
                    counts,
                })
            })
            .await
    }

    /// Delete a desktop subtree with everything it owns
    pub async fn delete_desktop(&self, desktop_id: &str) -> Result<CascadeReport, ServiceError> {
        let removed = self
            .store
            .batch(|s| {
                if !s.desktops.contains_key(desktop_id) {
                    return Err(ServiceError::not_found(EntityKind::Desktop, desktop_id));
                }
                Ok(ChangeJournal::stage_removals(s, |s| s.remove_desktop_cascade(desktop_id)))
            })
            .await?;

        info!(desktop_id, %removed, "Deleted desktop");
        self.deleted_event(EntityKind::Desktop, desktop_id, removed);
        Ok(removed)
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Create a note on top of every other note of the desktop
    pub async fn create_note(&self, desktop_id: &str, input: NewNote) -> Result<Note, ServiceError> {
        let title = validation::required_text("title", &input.title, MAX_TITLE_LEN)?;
        validation::bounded_text("content", &input.content, MAX_CONTENT_LEN)?;
        validation::color(input.color.as_deref())?;

        let note = self
            .store
            .batch(|s| {
                if !s.desktops.contains_key(desktop_id) {
                    return Err(ServiceError::not_found(EntityKind::Desktop, desktop_id));
                }
                let mut note = Note::new(desktop_id, title, input.position).with_content(input.content);
                note.color = input.color;
                note.z_index = top_z_index(s, desktop_id);

                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Note,
                    &note.id,
                    Some(serde_json::to_value(&note)?),
                );
                s.insert(note.clone().into());
                Ok(note)
            })
            .await?;

        debug!(note_id = %note.id, desktop_id, "Created note");
        self.put_event(EntityKind::Note, &note.id);
        Ok(note)
    }

    pub async fn update_note(&self, note_id: &str, update: NoteUpdate) -> Result<Note, ServiceError> {
        if let Some(title) = &update.title {
            validation::required_text("title", title, MAX_TITLE_LEN)?;
        }
        if let Some(content) = &update.content {
            validation::bounded_text("content", content, MAX_CONTENT_LEN)?;
        }
        if let Some(color) = &update.color {
            validation::color(color.as_deref())?;
        }
        if update.is_empty() {
            return self
                .store
                .note(note_id)
                .await
                .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id));
        }

        let payload = serde_json::to_value(&update)?;
        self.modify_note(note_id, Some(payload), |note| {
            if let Some(title) = update.title {
                note.title = title.trim().to_string();
            }
            if let Some(content) = update.content {
                note.content = content;
            }
            if let Some(position) = update.position {
                note.position = position;
            }
            if let Some(size) = update.size {
                note.size = size;
            }
            if let Some(minimized) = update.minimized {
                note.minimized = minimized;
            }
            if let Some(color) = update.color {
                note.color = color;
            }
        })
        .await
    }

    /// Raise a note above every other note on its desktop
    pub async fn bring_to_front(&self, note_id: &str) -> Result<Note, ServiceError> {
        let note = self
            .store
            .batch(|s| {
                let desktop_id = s
                    .notes
                    .get(note_id)
                    .map(|n| n.desktop_id.clone())
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id))?;
                let z_index = top_z_index(s, &desktop_id);
                let note = s
                    .notes
                    .get_mut(note_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id))?;
                note.z_index = z_index;
                note.updated_at = Utc::now();
                let note = note.clone();
                stage(
                    s,
                    ChangeKind::Update,
                    EntityKind::Note,
                    note_id,
                    Some(serde_json::json!({ "zIndex": z_index })),
                );
                Ok::<_, ServiceError>(note)
            })
            .await?;
        self.put_event(EntityKind::Note, note_id);
        Ok(note)
    }

    /// Copy a note (not its assets or connections) next to the original
    pub async fn duplicate_note(
        &self,
        note_id: &str,
        offset: Option<(f64, f64)>,
    ) -> Result<Note, ServiceError> {
        let (dx, dy) = offset.unwrap_or((DUPLICATE_OFFSET, DUPLICATE_OFFSET));

        let copy = self
            .store
            .batch(|s| {
                let source = s
                    .notes
                    .get(note_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id))?;

                let mut title = format!("{} (copy)", source.title);
                if title.chars().count() > MAX_TITLE_LEN {
                    title = title.chars().take(MAX_TITLE_LEN).collect();
                }
                let mut copy = Note::new(
                    source.desktop_id.clone(),
                    title,
                    source.position.offset(dx, dy),
                )
                .with_content(source.content.clone());
                copy.size = source.size;
                copy.color = source.color.clone();
                copy.minimized = false;
                copy.z_index = top_z_index(s, &copy.desktop_id);

                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Note,
                    &copy.id,
                    Some(serde_json::to_value(&copy)?),
                );
                s.insert(copy.clone().into());
                Ok::<_, ServiceError>(copy)
            })
            .await?;

        debug!(source = note_id, note_id = %copy.id, "Duplicated note");
        self.put_event(EntityKind::Note, &copy.id);
        Ok(copy)
    }

    pub async fn delete_note(&self, note_id: &str) -> Result<CascadeReport, ServiceError> {
        let removed = self
            .store
            .batch(|s| {
                if !s.notes.contains_key(note_id) {
                    return Err(ServiceError::not_found(EntityKind::Note, note_id));
                }
                Ok(ChangeJournal::stage_removals(s, |s| s.remove_note_cascade(note_id)))
            })
            .await?;

        debug!(note_id, %removed, "Deleted note");
        self.deleted_event(EntityKind::Note, note_id, removed);
        Ok(removed)
    }

    async fn modify_note(
        &self,
        note_id: &str,
        payload: Option<serde_json::Value>,
        f: impl FnOnce(&mut Note),
    ) -> Result<Note, ServiceError> {
        let note = self
            .store
            .batch(|s| {
                let note = s
                    .notes
                    .get_mut(note_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id))?;
                f(note);
                note.updated_at = Utc::now();
                let note = note.clone();
                stage(s, ChangeKind::Update, EntityKind::Note, note_id, payload);
                Ok::<_, ServiceError>(note)
            })
            .await?;
        self.put_event(EntityKind::Note, note_id);
        Ok(note)
    }

    // =========================================================================
    // Assets
    // =========================================================================

    /// Attach an image to a note
    pub async fn add_asset(
        &self,
        note_id: &str,
        data: Vec<u8>,
        mime_type: &str,
        original_name: Option<String>,
    ) -> Result<Asset, ServiceError> {
        validation::image_payload(mime_type, data.len(), self.max_asset_bytes)?;

        let asset = self
            .store
            .batch(|s| {
                if !s.notes.contains_key(note_id) {
                    return Err(ServiceError::not_found(EntityKind::Note, note_id));
                }
                let mut asset = Asset::new(note_id, data, mime_type);
                asset.original_name = original_name;
                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Asset,
                    &asset.id,
                    Some(serde_json::json!({
                        "noteId": note_id,
                        "mimeType": mime_type,
                        "bytes": asset.byte_len(),
                    })),
                );
                s.insert(asset.clone().into());
                Ok(asset)
            })
            .await?;

        debug!(asset_id = %asset.id, note_id, bytes = asset.byte_len(), "Added asset");
        self.put_event(EntityKind::Asset, &asset.id);
        Ok(asset)
    }

    pub async fn move_asset(&self, asset_id: &str, position: Position) -> Result<Asset, ServiceError> {
        let asset = self
            .store
            .batch(|s| {
                let asset = s
                    .assets
                    .get_mut(asset_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Asset, asset_id))?;
                asset.position = position;
                let asset = asset.clone();
                stage(
                    s,
                    ChangeKind::Update,
                    EntityKind::Asset,
                    asset_id,
                    Some(serde_json::to_value(position)?),
                );
                Ok::<_, ServiceError>(asset)
            })
            .await?;
        self.put_event(EntityKind::Asset, asset_id);
        Ok(asset)
    }

    pub async fn delete_asset(&self, asset_id: &str) -> Result<(), ServiceError> {
        self.delete_leaf(EntityKind::Asset, asset_id).await
    }

    // =========================================================================
    // Folders
    // =========================================================================

    /// Place a folder on `desktop_id` that opens `target_desktop_id`
    ///
    /// The target must be another non-root desktop of the same workspace.
    pub async fn create_folder(
        &self,
        desktop_id: &str,
        target_desktop_id: &str,
        name: &str,
        position: Position,
    ) -> Result<Folder, ServiceError> {
        let name = validation::required_text("name", name, MAX_NAME_LEN)?;

        let folder = self
            .store
            .batch(|s| {
                let desktop = s
                    .desktops
                    .get(desktop_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Desktop, desktop_id))?;
                let target = s.desktops.get(target_desktop_id).ok_or_else(|| {
                    ServiceError::not_found(EntityKind::Desktop, target_desktop_id)
                })?;
                if target.workspace_id != desktop.workspace_id {
                    return Err(ServiceError::from(ValidationError::InvalidReference(format!(
                        "folder target {} belongs to another workspace",
                        target_desktop_id
                    ))));
                }
                if target.is_root() || target.id == desktop.id {
                    return Err(ServiceError::hierarchy(format!(
                        "desktop {} cannot be the target of a folder on {}",
                        target_desktop_id, desktop_id
                    )));
                }

                let folder = Folder::new(desktop_id, target_desktop_id, name, position);
                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Folder,
                    &folder.id,
                    Some(serde_json::to_value(&folder)?),
                );
                s.insert(folder.clone().into());
                Ok(folder)
            })
            .await?;

        debug!(folder_id = %folder.id, desktop_id, target_desktop_id, "Created folder");
        self.put_event(EntityKind::Folder, &folder.id);
        Ok(folder)
    }

    /// Delete a folder and the desktop subtree it opens
    pub async fn delete_folder(&self, folder_id: &str) -> Result<CascadeReport, ServiceError> {
        let removed = self
            .store
            .batch(|s| {
                if !s.folders.contains_key(folder_id) {
                    return Err(ServiceError::not_found(EntityKind::Folder, folder_id));
                }
                Ok::<_, ServiceError>(ChangeJournal::stage_removals(s, |s| {
                    s.remove_folder_cascade(folder_id)
                }))
            })
            .await?;

        info!(folder_id, %removed, "Deleted folder");
        self.deleted_event(EntityKind::Folder, folder_id, removed);
        Ok(removed)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Connect two notes of the same desktop
    pub async fn create_connection(
        &self,
        desktop_id: &str,
        from_note_id: &str,
        to_note_id: &str,
        color: Option<&str>,
    ) -> Result<Connection, ServiceError> {
        validation::color(color)?;
        if from_note_id == to_note_id {
            return Err(ValidationError::InvalidReference(
                "a note cannot be connected to itself".to_string(),
            )
            .into());
        }

        let connection = self
            .store
            .batch(|s| {
                if !s.desktops.contains_key(desktop_id) {
                    return Err(ServiceError::not_found(EntityKind::Desktop, desktop_id));
                }
                for note_id in [from_note_id, to_note_id] {
                    let note = s
                        .notes
                        .get(note_id)
                        .ok_or_else(|| ServiceError::not_found(EntityKind::Note, note_id))?;
                    if note.desktop_id != desktop_id {
                        return Err(ServiceError::from(ValidationError::InvalidReference(format!(
                            "note {} is not on desktop {}",
                            note_id, desktop_id
                        ))));
                    }
                }
                if s.connections
                    .values()
                    .any(|c| c.from_note_id == from_note_id && c.to_note_id == to_note_id)
                {
                    return Err(ServiceError::from(ValidationError::InvalidReference(format!(
                        "notes {} and {} are already connected",
                        from_note_id, to_note_id
                    ))));
                }

                let mut connection = Connection::new(desktop_id, from_note_id, to_note_id);
                if let Some(color) = color {
                    connection.color = Some(color.to_string());
                }
                stage(
                    s,
                    ChangeKind::Create,
                    EntityKind::Connection,
                    &connection.id,
                    Some(serde_json::to_value(&connection)?),
                );
                s.insert(connection.clone().into());
                Ok(connection)
            })
            .await?;

        debug!(connection_id = %connection.id, from_note_id, to_note_id, "Created connection");
        self.put_event(EntityKind::Connection, &connection.id);
        Ok(connection)
    }

    pub async fn recolor_connection(
        &self,
        connection_id: &str,
        color: &str,
    ) -> Result<Connection, ServiceError> {
        validation::color(Some(color))?;
        let connection = self
            .store
            .batch(|s| {
                let connection = s.connections.get_mut(connection_id).ok_or_else(|| {
                    ServiceError::not_found(EntityKind::Connection, connection_id)
                })?;
                connection.color = Some(color.to_string());
                let connection = connection.clone();
                stage(
                    s,
                    ChangeKind::Update,
                    EntityKind::Connection,
                    connection_id,
                    Some(serde_json::json!({ "color": color })),
                );
                Ok::<_, ServiceError>(connection)
            })
            .await?;
        self.put_event(EntityKind::Connection, connection_id);
        Ok(connection)
    }

    pub async fn delete_connection(&self, connection_id: &str) -> Result<(), ServiceError> {
        self.delete_leaf(EntityKind::Connection, connection_id).await
    }

    async fn delete_leaf(&self, kind: EntityKind, id: &str) -> Result<(), ServiceError> {
        self.store
            .batch(|s| {
                if s.remove(kind, id).is_none() {
                    return Err(ServiceError::not_found(kind, id));
                }
                stage(s, ChangeKind::Delete, kind, id, None);
                Ok(())
            })
            .await?;
        self.deleted_event(kind, id, CascadeReport::default());
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn workspace_stats(&self, workspace_id: &str) -> Result<EntityCounts, ServiceError> {
        self.store
            .read(|s| {
                if !s.workspaces.contains_key(workspace_id) {
                    return Err(ServiceError::not_found(EntityKind::Workspace, workspace_id));
                }
                Ok(s.workspace_content(workspace_id).counts())
            })
            .await
    }

    /// Case-insensitive substring search over note titles and content
    ///
    /// `limit` is clamped to `1..=100`; most recently updated notes come first.
    pub async fn search_notes(
        &self,
        workspace_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Note>, ServiceError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ValidationError::MissingField("query".to_string()).into());
        }
        let limit = limit.clamp(1, 100);

        let mut hits = self.notes_of(workspace_id).await?;
        hits.retain(|n| {
            n.title.to_lowercase().contains(&needle) || n.content.to_lowercase().contains(&needle)
        });
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Most recently updated notes; `limit` is clamped to `1..=50`
    pub async fn recent_notes(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<Note>, ServiceError> {
        let mut notes = self.notes_of(workspace_id).await?;
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes.truncate(limit.clamp(1, 50));
        Ok(notes)
    }

    /// Notes reachable from `note_id` within `depth` hops, breadth-first
    ///
    /// `depth` is clamped to `1..=5`. The starting note is not included; each
    /// traversed connection is reported once.
    pub async fn connected_notes(
        &self,
        note_id: &str,
        depth: usize,
    ) -> Result<ConnectedNotes, ServiceError> {
        let depth = depth.clamp(1, 5);
        self.store
            .read(|s| {
                if !s.notes.contains_key(note_id) {
                    return Err(ServiceError::not_found(EntityKind::Note, note_id));
                }

                let mut result = ConnectedNotes::default();
                let mut seen_notes: HashSet<&str> = HashSet::from([note_id]);
                let mut seen_connections = HashSet::new();
                let mut queue = VecDeque::from([(note_id, 0usize)]);

                while let Some((current, level)) = queue.pop_front() {
                    if level >= depth {
                        continue;
                    }
                    for connection in s.connections.values().filter(|c| c.touches(current)) {
                        if seen_connections.insert(connection.id.as_str()) {
                            result.connections.push(connection.clone());
                        }
                        let other = if connection.from_note_id == current {
                            connection.to_note_id.as_str()
                        } else {
                            connection.from_note_id.as_str()
                        };
                        if !seen_notes.insert(other) {
                            continue;
                        }
                        if let Some(note) = s.notes.get(other) {
                            result.notes.push(note.clone());
                            queue.push_back((other, level + 1));
                        }
                    }
                }
                Ok(result)
            })
            .await
    }

    async fn notes_of(&self, workspace_id: &str) -> Result<Vec<Note>, ServiceError> {
        self.store
            .read(|s| {
                if !s.workspaces.contains_key(workspace_id) {
                    return Err(ServiceError::not_found(EntityKind::Workspace, workspace_id));
                }
                Ok(s.workspace_content(workspace_id).notes)
            })
            .await
    }
}

fn top_z_index(s: &StoreState, desktop_id: &str) -> i64 {
    s.notes
        .values()
        .filter(|n| n.desktop_id == desktop_id)
        .map(|n| n.z_index)
        .max()
        .map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (WorkspaceService, Arc<EntityStore>) {
        let store = Arc::new(EntityStore::in_memory());
        let service = WorkspaceService::new(store.clone(), &EngineConfig::default());
        (service, store)
    }

    async fn note_on(service: &WorkspaceService, desktop_id: &str, title: &str) -> Note {
        service
            .create_note(desktop_id, NewNote::new(title, Position::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_workspace_creates_single_root() {
        let (service, store) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        assert!(root.is_root());
        assert_eq!(ws.theme_config, ThemeConfig::default());

        let err = service.create_desktop(&ws.id, None, "Second").await.unwrap_err();
        assert!(matches!(err, ServiceError::Hierarchy(_)));

        let journal = ChangeJournal::new(store);
        assert_eq!(journal.len().await, 2);
    }

    #[tokio::test]
    async fn test_desktop_position_order_and_hierarchy() {
        let (service, _) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let a = service.create_desktop(&ws.id, Some(&root.id), "A").await.unwrap();
        let b = service.create_desktop(&ws.id, Some(&root.id), "B").await.unwrap();
        let a1 = service.create_desktop(&ws.id, Some(&a.id), "A1").await.unwrap();
        assert_eq!(a.position_order, 0);
        assert_eq!(b.position_order, 1);

        let levels = service.desktop_hierarchy(&ws.id, None).await.unwrap();
        let names: Vec<(&str, usize)> = levels
            .iter()
            .map(|l| (l.desktop.name.as_str(), l.level))
            .collect();
        assert_eq!(
            names,
            vec![(ROOT_DESKTOP_NAME, 0), ("A", 1), ("A1", 2), ("B", 1)]
        );

        let shallow = service.desktop_hierarchy(&ws.id, Some(1)).await.unwrap();
        assert!(shallow.iter().all(|l| l.desktop.id != a1.id));
    }

    #[tokio::test]
    async fn test_note_z_order_and_duplicate() {
        let (service, _) = service();
        let (_, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let first = service
            .create_note(&root.id, NewNote::new("First", Position::new(10.0, 10.0)))
            .await
            .unwrap();
        let second = service
            .create_note(&root.id, NewNote::new("Second", Position::default()))
            .await
            .unwrap();
        assert!(second.z_index > first.z_index);

        let raised = service.bring_to_front(&first.id).await.unwrap();
        assert!(raised.z_index > second.z_index);

        let copy = service.duplicate_note(&first.id, None).await.unwrap();
        assert_eq!(copy.title, "First (copy)");
        assert_eq!(copy.position, Position::new(40.0, 40.0));
        assert!(copy.z_index > raised.z_index);
    }

    #[tokio::test]
    async fn test_note_validation() {
        let (service, _) = service();
        let (_, root) = service.create_workspace("user-1", "Home").await.unwrap();

        let err = service
            .create_note(&root.id, NewNote::new("   ", Position::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::MissingField(_))));

        let err = service
            .create_note(
                &root.id,
                NewNote::new("ok", Position::default()).with_color("green"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::InvalidColor(_))));
    }

    #[tokio::test]
    async fn test_asset_rules() {
        let (service, _) = service();
        let (_, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let note = service
            .create_note(&root.id, NewNote::new("n", Position::default()))
            .await
            .unwrap();

        let err = service
            .add_asset(&note.id, vec![1, 2, 3], "application/pdf", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::UnsupportedMimeType(_))
        ));

        let asset = service
            .add_asset(&note.id, vec![1, 2, 3], "image/png", Some("a.png".into()))
            .await
            .unwrap();
        let moved = service
            .move_asset(&asset.id, Position::new(5.0, 6.0))
            .await
            .unwrap();
        assert_eq!(moved.position, Position::new(5.0, 6.0));

        service.delete_asset(&asset.id).await.unwrap();
        assert!(matches!(
            service.delete_asset(&asset.id).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_folder_target_rules_and_cascade() {
        let (service, store) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let child = service.create_desktop(&ws.id, Some(&root.id), "Child").await.unwrap();

        let err = service
            .create_folder(&child.id, &root.id, "Up", Position::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Hierarchy(_)));

        let folder = service
            .create_folder(&root.id, &child.id, "Child", Position::default())
            .await
            .unwrap();
        service
            .create_note(&child.id, NewNote::new("inside", Position::default()))
            .await
            .unwrap();

        let removed = service.delete_folder(&folder.id).await.unwrap();
        assert_eq!(removed.folders, 1);
        assert_eq!(removed.desktops, 1);
        assert_eq!(removed.notes, 1);
        assert!(store.desktop(&child.id).await.is_none());

        let journal = ChangeJournal::new(store);
        for id in [&folder.id, &child.id] {
            assert_eq!(journal.get(id).await.unwrap().kind, ChangeKind::Delete);
        }
    }

    #[tokio::test]
    async fn test_cascade_journals_every_removed_entity() {
        let (service, store) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let child = service.create_desktop(&ws.id, Some(&root.id), "Child").await.unwrap();
        let a = note_on(&service, &child.id, "a").await;
        let b = note_on(&service, &child.id, "b").await;
        let asset = service
            .add_asset(&a.id, vec![1, 2, 3], "image/png", None)
            .await
            .unwrap();
        let link = service.create_connection(&child.id, &a.id, &b.id, None).await.unwrap();
        let back = service
            .create_folder(&root.id, &child.id, "Child", Position::default())
            .await
            .unwrap();
        let kept = note_on(&service, &root.id, "kept").await;

        let journal = ChangeJournal::new(store);
        journal.clear().await.unwrap();

        service.delete_desktop(&child.id).await.unwrap();

        let deleted: Vec<(EntityKind, String)> = journal
            .list()
            .await
            .into_iter()
            .inspect(|c| assert_eq!(c.kind, ChangeKind::Delete))
            .map(|c| (c.entity_type, c.entity_id))
            .collect();
        for expected in [
            (EntityKind::Desktop, child.id.clone()),
            (EntityKind::Note, a.id.clone()),
            (EntityKind::Note, b.id.clone()),
            (EntityKind::Asset, asset.id.clone()),
            (EntityKind::Connection, link.id.clone()),
            (EntityKind::Folder, back.id.clone()),
        ] {
            assert!(deleted.contains(&expected), "missing {:?}", expected);
        }
        assert_eq!(deleted.len(), 6);
        assert!(journal.get(&kept.id).await.is_none());

        service.delete_note(&kept.id).await.unwrap();
        assert_eq!(journal.get(&kept.id).await.unwrap().kind, ChangeKind::Delete);
    }

    #[tokio::test]
    async fn test_connection_rules_and_graph() {
        let (service, _) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let other = service.create_desktop(&ws.id, Some(&root.id), "Other").await.unwrap();
        let a = note_on(&service, &root.id, "a").await;
        let b = note_on(&service, &root.id, "b").await;
        let c = note_on(&service, &root.id, "c").await;
        let far = note_on(&service, &other.id, "far").await;

        assert!(service.create_connection(&root.id, &a.id, &a.id, None).await.is_err());
        assert!(service.create_connection(&root.id, &a.id, &far.id, None).await.is_err());

        let ab = service.create_connection(&root.id, &a.id, &b.id, None).await.unwrap();
        assert_eq!(ab.color.as_deref(), Some("#00ff41"));
        assert!(service.create_connection(&root.id, &a.id, &b.id, None).await.is_err());
        service.create_connection(&root.id, &b.id, &c.id, None).await.unwrap();

        let one_hop = service.connected_notes(&a.id, 1).await.unwrap();
        assert_eq!(one_hop.notes.len(), 1);
        let two_hops = service.connected_notes(&a.id, 2).await.unwrap();
        assert_eq!(two_hops.notes.len(), 2);
        assert_eq!(two_hops.connections.len(), 2);

        let recolored = service.recolor_connection(&ab.id, "#123456").await.unwrap();
        assert_eq!(recolored.color.as_deref(), Some("#123456"));
    }

    #[tokio::test]
    async fn test_search_and_recent() {
        let (service, _) = service();
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        service
            .create_note(
                &root.id,
                NewNote::new("Groceries", Position::default()).with_content("Buy MILK"),
            )
            .await
            .unwrap();
        service
            .create_note(&root.id, NewNote::new("Ideas", Position::default()))
            .await
            .unwrap();

        let hits = service.search_notes(&ws.id, "milk", 500).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Groceries");

        let recent = service.recent_notes(&ws.id, 0).await.unwrap();
        assert_eq!(recent.len(), 1);

        let stats = service.workspace_stats(&ws.id).await.unwrap();
        assert_eq!(stats.desktops, 1);
        assert_eq!(stats.notes, 2);
    }
}
