//! Portable Document Codec
//!
//! Serializes a desktop subtree, with everything it owns, into a
//! self-contained document that uses its own local identifier space
//! (`desktop-1`, `note-3`, ...) and an explicit hierarchy table, and imports
//! such documents by minting fresh ids for every entity.
//!
//! # Document shape
//!
//! ```json
//! {
//!   "format": "deskflow-portable",
//!   "version": "1.0.0",
//!   "metadata": { "name", "exportedAt", "sourceVersion", "checksum" },
//!   "content": { "desktops": [ { ..., "notes", "folders", "connections" } ], "assets": [..] },
//!   "structure": { "rootDesktopLocalId", "hierarchy": { "<localId>": { "parentLocalId", "childrenLocalIds" } } }
//! }
//! ```
//!
//! Asset payloads travel inline as standard base64. The checksum is a 32-bit
//! rolling hash over the serialized `content`; it detects accidental
//! corruption and is not a security control. A mismatch is logged and
//! reported in [`ImportResult::checksum_valid`]; it only blocks the import
//! when `verify_import_checksum` is set.
//!
//! Parsing is strict: unknown fields, a foreign `format` tag, a different
//! major `version` or local ids used twice are rejected before anything is
//! written.

use crate::config::EngineConfig;
use crate::db::{ChangeJournal, EntityStore, ReloadReason, StoreEvent};
use crate::models::{
    Asset, Connection, Desktop, EntityKind, Folder, Note, Position, Size, SkipCounts,
    WorkspaceContent,
};
use crate::services::error::{FailureKind, ServiceError};
use crate::services::lease::OperationLeases;
use crate::services::replay::{replay, OrphanPolicy, ReplayOptions};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PORTABLE_FORMAT: &str = "deskflow-portable";
pub const PORTABLE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableDocument {
    pub format: String,
    pub version: String,
    pub metadata: PortableMetadata,
    pub content: PortableContent,
    pub structure: PortableStructure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableMetadata {
    pub name: String,
    pub exported_at: DateTime<Utc>,
    pub source_version: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableContent {
    pub desktops: Vec<PortableDesktop>,
    pub assets: Vec<PortableAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableDesktop {
    pub local_id: String,
    pub name: String,
    #[serde(default)]
    pub position_order: i64,
    #[serde(default)]
    pub notes: Vec<PortableNote>,
    #[serde(default)]
    pub folders: Vec<PortableFolder>,
    #[serde(default)]
    pub connections: Vec<PortableConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableNote {
    pub local_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub asset_local_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableAsset {
    pub local_id: String,
    pub note_local_id: String,
    #[serde(with = "crate::models::binary")]
    pub data: Vec<u8>,
    pub mime_type: String,
    pub size: Size,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub original_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableFolder {
    pub local_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub position: Position,
    /// `None` when the folder pointed outside the exported subtree
    pub target_desktop_local_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableConnection {
    pub local_id: String,
    pub from_note_local_id: String,
    pub to_note_local_id: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortableStructure {
    pub root_desktop_local_id: String,
    pub hierarchy: IndexMap<String, HierarchyEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HierarchyEntry {
    pub parent_local_id: Option<String>,
    #[serde(default)]
    pub children_local_ids: Vec<String>,
}

impl PortableDocument {
    /// Recompute `metadata.checksum` from the current content
    pub fn seal(&mut self) -> Result<(), ServiceError> {
        self.metadata.checksum = content_checksum(&self.content)?;
        Ok(())
    }

    pub fn verify_checksum(&self) -> Result<(), ServiceError> {
        let actual = content_checksum(&self.content)?;
        if actual != self.metadata.checksum {
            return Err(ServiceError::malformed(format!(
                "checksum mismatch: document says {}, content hashes to {}",
                self.metadata.checksum, actual
            )));
        }
        Ok(())
    }

    /// Format tag and major version must match this build
    pub fn check_compatibility(&self) -> Result<(), ServiceError> {
        if self.format != PORTABLE_FORMAT {
            return Err(ServiceError::malformed(format!(
                "unsupported document format '{}'",
                self.format
            )));
        }
        if major(&self.version) != major(PORTABLE_VERSION) {
            return Err(ServiceError::malformed(format!(
                "unsupported document version {} (expected {}.x)",
                self.version,
                major(PORTABLE_VERSION).unwrap_or_default()
            )));
        }
        Ok(())
    }

    pub fn note_count(&self) -> usize {
        self.content.desktops.iter().map(|d| d.notes.len()).sum()
    }
}

fn major(version: &str) -> Option<&str> {
    version.split('.').next().filter(|m| !m.is_empty())
}

/// `hash = hash * 31 + unit` over the UTF-16 units of the serialized content,
/// wrapping at 32 bits, rendered as 8 hex digits
pub fn rolling_hash(text: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| (h << 5).wrapping_sub(h).wrapping_add(i32::from(unit)));
    format!("{:08x}", hash as u32)
}

pub fn content_checksum(content: &PortableContent) -> Result<String, ServiceError> {
    Ok(rolling_hash(&serde_json::to_string(content)?))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub root_desktop_id: Option<String>,
    pub desktops_imported: usize,
    pub notes_imported: usize,
    pub assets_imported: usize,
    pub folders_imported: usize,
    pub connections_imported: usize,
    pub skipped: SkipCounts,
    /// Whether `metadata.checksum` matched the received content
    pub checksum_valid: bool,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

pub struct PortableCodec {
    store: Arc<EntityStore>,
    leases: OperationLeases,
    source_version: String,
    verify_checksum: bool,
}

impl PortableCodec {
    pub fn new(store: Arc<EntityStore>, leases: OperationLeases, config: &EngineConfig) -> Self {
        Self {
            store,
            leases,
            source_version: config.source_version.clone(),
            verify_checksum: config.verify_import_checksum,
        }
    }

    /// Export `root_desktop_id` and its descendants
    pub async fn export(&self, root_desktop_id: &str) -> Result<PortableDocument, ServiceError> {
        let root = self
            .store
            .desktop(root_desktop_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Desktop, root_desktop_id))?;
        let _lease = self.leases.acquire_workspace(&root.workspace_id)?;

        let content = self.store.subtree_content(root_desktop_id).await;
        let mut document = build_document(&root, &content, &self.source_version);
        document.seal()?;

        info!(
            root_desktop_id,
            counts = %content.counts(),
            checksum = %document.metadata.checksum,
            "Exported desktop subtree"
        );
        Ok(document)
    }

    pub async fn export_to_string(&self, root_desktop_id: &str) -> Result<String, ServiceError> {
        let document = self.export(root_desktop_id).await?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Strictly parse a document and check its format and version
    pub fn parse(text: &str) -> Result<PortableDocument, ServiceError> {
        let document: PortableDocument = serde_json::from_str(text)
            .map_err(|e| ServiceError::malformed(format!("invalid portable document: {}", e)))?;
        document.check_compatibility()?;
        Ok(document)
    }

    pub async fn import_str(
        &self,
        text: &str,
        workspace_id: &str,
        parent_desktop_id: Option<&str>,
    ) -> ImportResult {
        match Self::parse(text) {
            Ok(document) => self.import(&document, workspace_id, parent_desktop_id).await,
            Err(e) => failed_import(&e),
        }
    }

    /// Recreate the document's subtree in `workspace_id`
    ///
    /// With `parent_desktop_id` the imported root is grafted under that
    /// desktop; otherwise under the workspace's root desktop, or as the root of
    /// a workspace that has none. Folders and connections whose references do
    /// not resolve inside the document are skipped and counted.
    pub async fn import(
        &self,
        document: &PortableDocument,
        workspace_id: &str,
        parent_desktop_id: Option<&str>,
    ) -> ImportResult {
        match self.import_inner(document, workspace_id, parent_desktop_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(workspace_id, error = %e, "Import failed");
                failed_import(&e)
            }
        }
    }

    async fn import_inner(
        &self,
        document: &PortableDocument,
        workspace_id: &str,
        parent_desktop_id: Option<&str>,
    ) -> Result<ImportResult, ServiceError> {
        document.check_compatibility()?;
        let checksum_valid = match document.verify_checksum() {
            Ok(()) => true,
            Err(e) if self.verify_checksum => return Err(e),
            Err(e) => {
                warn!(name = %document.metadata.name, error = %e, "Importing document with a stale checksum");
                false
            }
        };
        let (source, order, mut skipped) = source_content(document)?;

        let _lease = self.leases.acquire_workspace(workspace_id)?;

        let replayed = self
            .store
            .batch(|s| {
                if !s.workspaces.contains_key(workspace_id) {
                    return Err(ServiceError::not_found(EntityKind::Workspace, workspace_id));
                }
                let graft_parent = match parent_desktop_id {
                    Some(parent_id) => {
                        let parent = s.desktops.get(parent_id).ok_or_else(|| {
                            ServiceError::not_found(EntityKind::Desktop, parent_id)
                        })?;
                        if parent.workspace_id != workspace_id {
                            return Err(ServiceError::hierarchy(format!(
                                "desktop {} does not belong to workspace {}",
                                parent_id, workspace_id
                            )));
                        }
                        Some(parent_id.to_string())
                    }
                    None => s.root_desktop(workspace_id).map(|d| d.id.clone()),
                };

                let replayed = replay(
                    &source,
                    &ReplayOptions {
                        workspace_id: workspace_id.to_string(),
                        desktop_order: order,
                        graft: Some((document.structure.root_desktop_local_id.clone(), graft_parent)),
                        orphans: OrphanPolicy::AttachToRoot,
                    },
                );

                ChangeJournal::stage_creates(s, &replayed.content);
                s.insert_content(replayed.content.clone());
                Ok(replayed)
            })
            .await?;

        skipped.desktops += replayed.skipped.desktops;
        skipped.notes += replayed.skipped.notes;
        skipped.assets += replayed.skipped.assets;
        skipped.folders += replayed.skipped.folders;
        skipped.connections += replayed.skipped.connections;

        self.store.notify(StoreEvent::Reloaded {
            reason: ReloadReason::Import,
        });

        let counts = replayed.content.counts();
        info!(
            workspace_id,
            name = %document.metadata.name,
            %counts,
            skipped = skipped.total(),
            "Imported portable document"
        );

        Ok(ImportResult {
            success: true,
            root_desktop_id: replayed.root_desktop_id,
            desktops_imported: counts.desktops,
            notes_imported: counts.notes,
            assets_imported: counts.assets,
            folders_imported: counts.folders,
            connections_imported: counts.connections,
            skipped,
            checksum_valid,
            failure: None,
            error: None,
        })
    }
}

fn failed_import(error: &ServiceError) -> ImportResult {
    ImportResult {
        success: false,
        failure: Some(error.kind()),
        error: Some(error.to_string()),
        ..Default::default()
    }
}

/// Assigns `<prefix>-<n>` ids in first-seen order
struct LocalIds {
    prefix: &'static str,
    ids: HashMap<String, String>,
}

impl LocalIds {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            ids: HashMap::new(),
        }
    }

    fn assign(&mut self, id: &str) -> String {
        let next = self.ids.len() + 1;
        self.ids
            .entry(id.to_string())
            .or_insert_with(|| format!("{}-{}", self.prefix, next))
            .clone()
    }

    fn get(&self, id: &str) -> Option<String> {
        self.ids.get(id).cloned()
    }
}

fn build_document(root: &Desktop, content: &WorkspaceContent, source_version: &str) -> PortableDocument {
    let mut desktop_ids = LocalIds::new("desktop");
    let mut note_ids = LocalIds::new("note");
    let mut asset_ids = LocalIds::new("asset");
    let mut folder_ids = LocalIds::new("folder");
    let mut connection_ids = LocalIds::new("connection");

    for desktop in &content.desktops {
        desktop_ids.assign(&desktop.id);
    }

    let mut hierarchy = IndexMap::new();
    for desktop in &content.desktops {
        let local_id = desktop_ids.assign(&desktop.id);
        let parent_local_id = if desktop.id == root.id {
            None
        } else {
            desktop.parent_id.as_deref().and_then(|p| desktop_ids.get(p))
        };
        let children_local_ids = content
            .desktops
            .iter()
            .filter(|d| d.parent_id.as_deref() == Some(desktop.id.as_str()))
            .filter_map(|d| desktop_ids.get(&d.id))
            .collect();
        hierarchy.insert(
            local_id,
            HierarchyEntry {
                parent_local_id,
                children_local_ids,
            },
        );
    }

    let mut assets = Vec::with_capacity(content.assets.len());
    let mut desktops = Vec::with_capacity(content.desktops.len());

    for desktop in &content.desktops {
        let mut notes = Vec::new();
        for note in content.notes_in(&desktop.id) {
            let note_local = note_ids.assign(&note.id);
            let mut asset_local_ids = Vec::new();
            for asset in content.assets_of(&note.id) {
                let asset_local = asset_ids.assign(&asset.id);
                asset_local_ids.push(asset_local.clone());
                assets.push(PortableAsset {
                    local_id: asset_local,
                    note_local_id: note_local.clone(),
                    data: asset.data.clone(),
                    mime_type: asset.mime_type.clone(),
                    size: asset.size,
                    position: asset.position,
                    original_name: asset.original_name.clone(),
                });
            }
            notes.push(PortableNote {
                local_id: note_local,
                title: note.title.clone(),
                content: note.content.clone(),
                position: note.position,
                size: note.size,
                z_index: note.z_index,
                minimized: note.minimized,
                color: note.color.clone(),
                asset_local_ids,
            });
        }

        let folders = content
            .folders_in(&desktop.id)
            .map(|folder| PortableFolder {
                local_id: folder_ids.assign(&folder.id),
                name: folder.name.clone(),
                icon: folder.icon.clone(),
                color: folder.color.clone(),
                position: folder.position,
                target_desktop_local_id: desktop_ids.get(&folder.target_desktop_id),
            })
            .collect();

        let connections = content
            .connections_in(&desktop.id)
            .filter_map(|connection| {
                Some(PortableConnection {
                    local_id: connection_ids.assign(&connection.id),
                    from_note_local_id: note_ids.get(&connection.from_note_id)?,
                    to_note_local_id: note_ids.get(&connection.to_note_id)?,
                    color: connection.color.clone(),
                })
            })
            .collect();

        desktops.push(PortableDesktop {
            local_id: desktop_ids.assign(&desktop.id),
            name: desktop.name.clone(),
            position_order: desktop.position_order,
            notes,
            folders,
            connections,
        });
    }

    PortableDocument {
        format: PORTABLE_FORMAT.to_string(),
        version: PORTABLE_VERSION.to_string(),
        metadata: PortableMetadata {
            name: root.name.clone(),
            exported_at: Utc::now(),
            source_version: source_version.to_string(),
            checksum: String::new(),
        },
        content: PortableContent { desktops, assets },
        structure: PortableStructure {
            root_desktop_local_id: desktop_ids.assign(&root.id),
            hierarchy,
        },
    }
}

/// Desktop local ids with parents first: depth-first from the declared root
/// through the hierarchy table, then any unvisited desktop in document order
fn import_order(document: &PortableDocument) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(document.content.desktops.len());
    let mut stack = vec![document.structure.root_desktop_local_id.clone()];

    let known: HashSet<&str> = document
        .content
        .desktops
        .iter()
        .map(|d| d.local_id.as_str())
        .collect();

    while let Some(id) = stack.pop() {
        if !known.contains(id.as_str()) || !visited.insert(id.clone()) {
            continue;
        }
        if let Some(entry) = document.structure.hierarchy.get(&id) {
            stack.extend(entry.children_local_ids.iter().rev().cloned());
        }
        order.push(id);
    }

    for desktop in &document.content.desktops {
        if visited.insert(desktop.local_id.clone()) {
            debug!(desktop = %desktop.local_id, "Desktop unreachable from root; appending");
            order.push(desktop.local_id.clone());
        }
    }

    order
}

fn ensure_unique<'a>(
    kind: &str,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, ServiceError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ServiceError::malformed(format!("duplicate {} local id '{}'", kind, id)));
        }
    }
    Ok(seen)
}

/// Local ids must be unique per kind and every asset must agree with the
/// note that lists it
fn check_local_ids(document: &PortableDocument) -> Result<HashSet<&str>, ServiceError> {
    let desktops = &document.content.desktops;
    let seen = ensure_unique("desktop", desktops.iter().map(|d| d.local_id.as_str()))?;
    let notes = || desktops.iter().flat_map(|d| d.notes.iter());
    ensure_unique("note", notes().map(|n| n.local_id.as_str()))?;
    ensure_unique(
        "folder",
        desktops.iter().flat_map(|d| d.folders.iter()).map(|f| f.local_id.as_str()),
    )?;
    ensure_unique(
        "connection",
        desktops
            .iter()
            .flat_map(|d| d.connections.iter())
            .map(|c| c.local_id.as_str()),
    )?;
    ensure_unique("asset", document.content.assets.iter().map(|a| a.local_id.as_str()))?;

    let mut listed_by: HashMap<&str, &str> = HashMap::new();
    for note in notes() {
        for asset_id in &note.asset_local_ids {
            if let Some(other) = listed_by.insert(asset_id.as_str(), note.local_id.as_str()) {
                return Err(ServiceError::malformed(format!(
                    "asset '{}' is listed by notes '{}' and '{}'",
                    asset_id, other, note.local_id
                )));
            }
        }
    }
    for asset in &document.content.assets {
        if let Some(owner) = listed_by.get(asset.local_id.as_str()) {
            if *owner != asset.note_local_id {
                return Err(ServiceError::malformed(format!(
                    "asset '{}' names note '{}' but is listed by note '{}'",
                    asset.local_id, asset.note_local_id, owner
                )));
            }
        }
    }

    Ok(seen)
}

/// The document as workspace content keyed by its local ids
///
/// Folders that point outside the exported subtree are dropped here and
/// counted as skipped.
fn source_content(
    document: &PortableDocument,
) -> Result<(WorkspaceContent, Vec<String>, SkipCounts), ServiceError> {
    let seen = check_local_ids(document)?;
    let root = &document.structure.root_desktop_local_id;
    if !seen.contains(root.as_str()) {
        return Err(ServiceError::malformed(format!(
            "root desktop '{}' is not part of the document",
            root
        )));
    }

    let now = Utc::now();
    let mut skipped = SkipCounts::default();
    let mut content = WorkspaceContent::default();

    for d in &document.content.desktops {
        let parent_id = if &d.local_id == root {
            None
        } else {
            document
                .structure
                .hierarchy
                .get(&d.local_id)
                .and_then(|entry| entry.parent_local_id.clone())
        };
        content.desktops.push(Desktop {
            id: d.local_id.clone(),
            workspace_id: String::new(),
            parent_id,
            name: d.name.clone(),
            position_order: d.position_order,
            created_at: now,
        });

        for n in &d.notes {
            content.notes.push(Note {
                id: n.local_id.clone(),
                desktop_id: d.local_id.clone(),
                title: n.title.clone(),
                content: n.content.clone(),
                position: n.position,
                size: n.size,
                z_index: n.z_index,
                minimized: n.minimized,
                color: n.color.clone(),
                created_at: now,
                updated_at: now,
            });
        }

        for f in &d.folders {
            let Some(target) = &f.target_desktop_local_id else {
                skipped.folders += 1;
                continue;
            };
            content.folders.push(Folder {
                id: f.local_id.clone(),
                desktop_id: d.local_id.clone(),
                target_desktop_id: target.clone(),
                name: f.name.clone(),
                icon: f.icon.clone(),
                color: f.color.clone(),
                position: f.position,
                created_at: now,
            });
        }

        for c in &d.connections {
            content.connections.push(Connection {
                id: c.local_id.clone(),
                desktop_id: d.local_id.clone(),
                from_note_id: c.from_note_local_id.clone(),
                to_note_id: c.to_note_local_id.clone(),
                color: c.color.clone(),
                created_at: now,
            });
        }
    }

    for a in &document.content.assets {
        content.assets.push(Asset {
            id: a.local_id.clone(),
            note_id: a.note_local_id.clone(),
            data: a.data.clone(),
            mime_type: a.mime_type.clone(),
            size: a.size,
            position: a.position,
            original_name: a.original_name.clone(),
            created_at: now,
        });
    }

    Ok((content, import_order(document), skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_hash_is_stable() {
        assert_eq!(rolling_hash(""), "00000000");
        // 'a' = 97
        assert_eq!(rolling_hash("a"), "00000061");
        // 97 * 31 + 98
        assert_eq!(rolling_hash("ab"), format!("{:08x}", 97 * 31 + 98));
        assert_ne!(rolling_hash("ab"), rolling_hash("ba"));
    }

    #[test]
    fn test_major_version_check() {
        let mut doc = PortableDocument {
            format: PORTABLE_FORMAT.to_string(),
            version: "1.4.2".to_string(),
            metadata: PortableMetadata {
                name: "x".to_string(),
                exported_at: Utc::now(),
                source_version: "0.1.0".to_string(),
                checksum: String::new(),
            },
            content: PortableContent::default(),
            structure: PortableStructure {
                root_desktop_local_id: "desktop-1".to_string(),
                hierarchy: IndexMap::new(),
            },
        };
        assert!(doc.check_compatibility().is_ok());

        doc.version = "2.0.0".to_string();
        assert!(doc.check_compatibility().is_err());

        doc.version = PORTABLE_VERSION.to_string();
        doc.format = "other".to_string();
        assert!(doc.check_compatibility().is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = PortableCodec::parse(r#"{"format":"deskflow-portable","extra":1}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedInput(_)));
    }

    #[test]
    fn test_import_order_handles_disconnected_desktops() {
        let desktop = |id: &str| PortableDesktop {
            local_id: id.to_string(),
            name: id.to_string(),
            position_order: 0,
            notes: vec![],
            folders: vec![],
            connections: vec![],
        };
        let mut hierarchy = IndexMap::new();
        hierarchy.insert(
            "desktop-1".to_string(),
            HierarchyEntry {
                parent_local_id: None,
                children_local_ids: vec!["desktop-3".to_string()],
            },
        );
        let doc = PortableDocument {
            format: PORTABLE_FORMAT.to_string(),
            version: PORTABLE_VERSION.to_string(),
            metadata: PortableMetadata {
                name: "x".to_string(),
                exported_at: Utc::now(),
                source_version: "0.1.0".to_string(),
                checksum: String::new(),
            },
            content: PortableContent {
                desktops: vec![desktop("desktop-2"), desktop("desktop-3"), desktop("desktop-1")],
                assets: vec![],
            },
            structure: PortableStructure {
                root_desktop_local_id: "desktop-1".to_string(),
                hierarchy,
            },
        };

        assert_eq!(import_order(&doc), vec!["desktop-1", "desktop-3", "desktop-2"]);
    }
}
