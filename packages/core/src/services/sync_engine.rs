//! Sync Engine
//!
//! Full-replace synchronization between the local [`EntityStore`] and a
//! [`RemoteBackend`]. Neither direction merges:
//!
//! - **Push** deletes every remote desktop, note, asset, folder and connection
//!   of the principal's default workspace, re-uploads the whole local content
//!   (desktops in two passes so parents can be linked after all rows exist),
//!   then records a remote version row.
//! - **Pull** reads the remote default workspace and replaces all local
//!   content with it, minting fresh local ids for every entity.
//!
//! Remote ids are not stable across pushes and local ids are not stable across
//! pulls. A failure part-way through either sequence is reported once as a
//! failed result; remote writes that already happened stay applied.
//!
//! # Status
//!
//! Progress is published as a [`SyncStatus`] on a watch channel. A successful
//! operation reverts to `Idle` after the configured delay; a failure stays
//! visible until the next operation starts.

use crate::config::EngineConfig;
use crate::db::{ChangeJournal, EntityStore, ReloadReason};
use crate::models::{
    Asset, Connection, Desktop, EntityCounts, EntityKind, Folder, Note, Position, SkipCounts,
    Size, Workspace, WorkspaceContent, WorkspaceSnapshot,
};
use crate::remote::rows::{
    from_row, row_id, to_row, AssetRow, ConnectionRow, DesktopRow, FolderRow, NoteRow,
    VersionRow, WorkspaceRow,
};
use crate::remote::{RemoteBackend, RemoteError, RemoteTable, Row, RowFilter};
use crate::services::error::{FailureKind, ServiceError};
use crate::services::id_map::IdMap;
use crate::services::lease::{LeaseScope, OperationLeases};
use crate::services::replay::{parent_first_order, replay, OrphanPolicy, ReplayOptions};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced { version: Option<i64> },
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub version_number: Option<i64>,
    pub counts: EntityCounts,
    pub skipped: SkipCounts,
    pub failure: Option<FailureKind>,
    pub errors: Vec<String>,
}

impl SyncResult {
    fn failed(error: &ServiceError) -> Self {
        Self {
            success: false,
            failure: Some(error.kind()),
            errors: vec![error.to_string()],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub success: bool,
    /// False when the principal has no remote workspace yet
    pub loaded: bool,
    pub workspace_id: Option<String>,
    pub counts: EntityCounts,
    pub skipped: SkipCounts,
    pub failure: Option<FailureKind>,
    pub errors: Vec<String>,
}

impl PullResult {
    fn failed(error: &ServiceError) -> Self {
        Self {
            success: false,
            failure: Some(error.kind()),
            errors: vec![error.to_string()],
            ..Default::default()
        }
    }
}

struct PushOutcome {
    version_number: i64,
    counts: EntityCounts,
    skipped: SkipCounts,
}

struct PullOutcome {
    workspace_id: String,
    counts: EntityCounts,
    skipped: SkipCounts,
}

fn at(stage: &'static str) -> impl Fn(RemoteError) -> ServiceError {
    move |e| ServiceError::remote_stage(stage, e)
}

fn require_id(table: RemoteTable, id: Option<String>) -> Result<String, RemoteError> {
    id.ok_or_else(|| RemoteError::decode(table, "row has no id"))
}

pub struct SyncEngine {
    store: Arc<EntityStore>,
    journal: ChangeJournal,
    remote: Option<Arc<dyn RemoteBackend>>,
    leases: OperationLeases,
    status: Arc<watch::Sender<SyncStatus>>,
    status_generation: Arc<AtomicU64>,
    asset_bucket: String,
    reset_delay: Duration,
}

impl SyncEngine {
    pub fn new(
        store: Arc<EntityStore>,
        remote: Option<Arc<dyn RemoteBackend>>,
        leases: OperationLeases,
        config: &EngineConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            journal: ChangeJournal::new(Arc::clone(&store)),
            store,
            remote,
            leases,
            status: Arc::new(status),
            status_generation: Arc::new(AtomicU64::new(0)),
            asset_bucket: config.asset_bucket.clone(),
            reset_delay: Duration::from_millis(config.status_reset_delay_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: SyncStatus) -> u64 {
        let generation = self.status_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(status);
        generation
    }

    fn succeed(&self, version: Option<i64>) {
        let generation = self.set_status(SyncStatus::Synced { version });
        let status = Arc::clone(&self.status);
        let current = Arc::clone(&self.status_generation);
        let delay = self.reset_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            status.send_if_modified(|s| {
                if current.load(Ordering::SeqCst) == generation {
                    *s = SyncStatus::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }

    fn fail(&self, error: &ServiceError) {
        self.set_status(SyncStatus::Error {
            message: error.to_string(),
        });
    }

    fn configured_remote(&self) -> Result<Arc<dyn RemoteBackend>, ServiceError> {
        self.remote.clone().ok_or(ServiceError::NotConfigured)
    }

    /// Replace the principal's remote workspace with the local one
    pub async fn push(&self, workspace_id: &str) -> SyncResult {
        let _lease = match self.leases.acquire_workspace(workspace_id) {
            Ok(lease) => lease,
            Err(e) => return SyncResult::failed(&e),
        };
        let remote = match self.configured_remote() {
            Ok(remote) => remote,
            Err(e) => {
                self.fail(&e);
                return SyncResult::failed(&e);
            }
        };

        self.set_status(SyncStatus::Syncing);
        info!(workspace_id, "Push started");

        match self.push_inner(remote.as_ref(), workspace_id).await {
            Ok(outcome) => {
                info!(
                    workspace_id,
                    version = outcome.version_number,
                    counts = %outcome.counts,
                    skipped = outcome.skipped.total(),
                    "Push completed"
                );
                self.succeed(Some(outcome.version_number));
                SyncResult {
                    success: true,
                    version_number: Some(outcome.version_number),
                    counts: outcome.counts,
                    skipped: outcome.skipped,
                    failure: None,
                    errors: Vec::new(),
                }
            }
            Err(e) => {
                warn!(workspace_id, error = %e, "Push failed");
                self.fail(&e);
                SyncResult::failed(&e)
            }
        }
    }

    async fn push_inner(
        &self,
        remote: &dyn RemoteBackend,
        workspace_id: &str,
    ) -> Result<PushOutcome, ServiceError> {
        let principal = remote
            .principal()
            .await
            .map_err(at("authenticate"))?
            .ok_or(ServiceError::NotConfigured)?;
        let workspace = self
            .store
            .workspace(workspace_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Workspace, workspace_id))?;
        let content = self.store.workspace_content(workspace_id).await;

        let remote_ws = self
            .resolve_remote_workspace(remote, &principal, &workspace)
            .await?;
        self.clear_remote_children(remote, &remote_ws).await?;
        let desktops = self.upload_desktops(remote, &remote_ws, &content).await?;
        let (counts, skipped) = self
            .upload_desktop_content(remote, &principal, &content, &desktops)
            .await?;
        let version_number = self
            .create_remote_version(remote, &remote_ws, &workspace, &content, &counts)
            .await?;

        let cleared = self.journal.clear().await?;
        debug!(cleared, "Cleared change journal after push");

        Ok(PushOutcome {
            version_number,
            counts,
            skipped,
        })
    }

    async fn resolve_remote_workspace(
        &self,
        remote: &dyn RemoteBackend,
        principal: &str,
        workspace: &Workspace,
    ) -> Result<String, ServiceError> {
        let existing = remote
            .select(
                RemoteTable::Workspaces,
                &RowFilter::new()
                    .eq("user_id", principal)
                    .eq("is_default", true)
                    .limit(1),
            )
            .await
            .map_err(at("resolve workspace"))?;

        if let Some(row) = existing.into_iter().next() {
            let id = row_id(RemoteTable::Workspaces, &row).map_err(at("resolve workspace"))?;
            let mut patch = Row::new();
            patch.insert(
                "theme_config".to_string(),
                serde_json::to_value(&workspace.theme_config)?,
            );
            patch.insert("name".to_string(), Value::String(workspace.name.clone()));
            remote
                .update(
                    RemoteTable::Workspaces,
                    &RowFilter::new().eq("id", id.as_str()),
                    patch,
                )
                .await
                .map_err(at("update workspace theme"))?;
            return Ok(id);
        }

        let row = to_row(
            RemoteTable::Workspaces,
            &WorkspaceRow {
                id: None,
                user_id: principal.to_string(),
                name: workspace.name.clone(),
                description: workspace.description.clone(),
                is_default: true,
                theme_config: workspace.theme_config.clone(),
            },
        )
        .map_err(at("create workspace"))?;
        let stored = remote
            .upsert(RemoteTable::Workspaces, row)
            .await
            .map_err(at("create workspace"))?;
        row_id(RemoteTable::Workspaces, &stored).map_err(at("create workspace"))
    }

    /// Delete every remote child row of the workspace, leaf kinds first
    async fn clear_remote_children(
        &self,
        remote: &dyn RemoteBackend,
        remote_ws: &str,
    ) -> Result<(), ServiceError> {
        let stage = "clear remote content";
        let in_workspace = RowFilter::new().eq("workspace_id", remote_ws);

        let desktop_ids = ids_of(
            RemoteTable::Desktops,
            remote
                .select(RemoteTable::Desktops, &in_workspace)
                .await
                .map_err(at(stage))?,
        )
        .map_err(at(stage))?;

        if !desktop_ids.is_empty() {
            let in_desktops = RowFilter::new().is_in("desktop_id", desktop_ids);
            let note_ids = ids_of(
                RemoteTable::Notes,
                remote
                    .select(RemoteTable::Notes, &in_desktops)
                    .await
                    .map_err(at(stage))?,
            )
            .map_err(at(stage))?;

            if !note_ids.is_empty() {
                let in_notes = RowFilter::new().is_in("note_id", note_ids);
                let mut paths = Vec::new();
                for row in remote
                    .select(RemoteTable::Assets, &in_notes)
                    .await
                    .map_err(at(stage))?
                {
                    let asset: AssetRow = from_row(RemoteTable::Assets, row).map_err(at(stage))?;
                    paths.push(asset.storage_path);
                }
                if !paths.is_empty() {
                    remote
                        .remove(&self.asset_bucket, &paths)
                        .await
                        .map_err(at(stage))?;
                }
                remote
                    .delete(RemoteTable::Assets, &in_notes)
                    .await
                    .map_err(at(stage))?;
            }

            for table in [
                RemoteTable::Connections,
                RemoteTable::Folders,
                RemoteTable::Notes,
            ] {
                let removed = remote.delete(table, &in_desktops).await.map_err(at(stage))?;
                debug!(%table, removed, "Cleared remote rows");
            }
        }

        remote
            .delete(RemoteTable::Desktops, &in_workspace)
            .await
            .map_err(at(stage))?;
        Ok(())
    }

    /// Insert every desktop parentless, then link parents through the new ids
    async fn upload_desktops(
        &self,
        remote: &dyn RemoteBackend,
        remote_ws: &str,
        content: &WorkspaceContent,
    ) -> Result<IdMap, ServiceError> {
        let mut desktops = IdMap::new();

        for desktop in &content.desktops {
            let row = to_row(
                RemoteTable::Desktops,
                &DesktopRow {
                    id: None,
                    workspace_id: remote_ws.to_string(),
                    parent_id: None,
                    name: desktop.name.clone(),
                    position_order: desktop.position_order,
                },
            )
            .map_err(at("upload desktops"))?;
            let stored = remote
                .upsert(RemoteTable::Desktops, row)
                .await
                .map_err(at("upload desktops"))?;
            let remote_id =
                row_id(RemoteTable::Desktops, &stored).map_err(at("upload desktops"))?;
            desktops.record(desktop.id.as_str(), remote_id);
        }

        for desktop in &content.desktops {
            let Some(parent) = desktop.parent_id.as_deref() else {
                continue;
            };
            let (Some(remote_id), Some(remote_parent)) =
                (desktops.resolve(&desktop.id), desktops.resolve(parent))
            else {
                debug!(desktop = %desktop.id, parent, "Parent not uploaded; leaving desktop unlinked");
                continue;
            };

            let mut patch = Row::new();
            patch.insert(
                "parent_id".to_string(),
                Value::String(remote_parent.to_string()),
            );
            remote
                .update(
                    RemoteTable::Desktops,
                    &RowFilter::new().eq("id", remote_id),
                    patch,
                )
                .await
                .map_err(at("link desktop parents"))?;
        }

        Ok(desktops)
    }

    async fn upload_desktop_content(
        &self,
        remote: &dyn RemoteBackend,
        principal: &str,
        content: &WorkspaceContent,
        desktops: &IdMap,
    ) -> Result<(EntityCounts, SkipCounts), ServiceError> {
        let mut counts = EntityCounts {
            desktops: desktops.len(),
            ..Default::default()
        };
        let mut skipped = SkipCounts::default();
        let mut notes = IdMap::new();

        for desktop in &content.desktops {
            let Some(remote_desktop) = desktops.resolve(&desktop.id) else {
                continue;
            };

            for note in content.notes_in(&desktop.id) {
                let row = to_row(
                    RemoteTable::Notes,
                    &NoteRow {
                        id: None,
                        desktop_id: remote_desktop.to_string(),
                        title: note.title.clone(),
                        content: note.content.clone(),
                        position_x: note.position.x,
                        position_y: note.position.y,
                        width: note.size.width,
                        height: note.size.height,
                        z_index: note.z_index,
                        minimized: note.minimized,
                        color: note.color.clone(),
                    },
                )
                .map_err(at("upload notes"))?;
                let stored = remote
                    .upsert(RemoteTable::Notes, row)
                    .await
                    .map_err(at("upload notes"))?;
                let remote_note = row_id(RemoteTable::Notes, &stored).map_err(at("upload notes"))?;
                notes.record(note.id.as_str(), remote_note.as_str());
                counts.notes += 1;

                for asset in content.assets_of(&note.id) {
                    let path = format!(
                        "{}/{}/{}.{}",
                        principal,
                        remote_note,
                        asset.id,
                        asset.extension()
                    );
                    remote
                        .upload(&self.asset_bucket, &path, asset.data.clone(), &asset.mime_type)
                        .await
                        .map_err(at("upload asset payloads"))?;

                    let row = to_row(
                        RemoteTable::Assets,
                        &AssetRow {
                            id: None,
                            note_id: remote_note.clone(),
                            storage_path: path,
                            mime_type: asset.mime_type.clone(),
                            original_name: asset.original_name.clone(),
                            width: asset.size.width,
                            height: asset.size.height,
                            position_x: asset.position.x,
                            position_y: asset.position.y,
                        },
                    )
                    .map_err(at("upload assets"))?;
                    remote
                        .upsert(RemoteTable::Assets, row)
                        .await
                        .map_err(at("upload assets"))?;
                    counts.assets += 1;
                }
            }

            for folder in content.folders_in(&desktop.id) {
                let Some(remote_target) = desktops.resolve(&folder.target_desktop_id) else {
                    debug!(folder = %folder.id, "Skipping folder with unknown target");
                    skipped.folders += 1;
                    continue;
                };
                let row = to_row(
                    RemoteTable::Folders,
                    &FolderRow {
                        id: None,
                        desktop_id: remote_desktop.to_string(),
                        target_desktop_id: remote_target.to_string(),
                        name: folder.name.clone(),
                        icon: folder.icon.clone(),
                        color: folder.color.clone(),
                        position_x: folder.position.x,
                        position_y: folder.position.y,
                    },
                )
                .map_err(at("upload folders"))?;
                remote
                    .upsert(RemoteTable::Folders, row)
                    .await
                    .map_err(at("upload folders"))?;
                counts.folders += 1;
            }

            for connection in content.connections_in(&desktop.id) {
                let (Some(from), Some(to)) = (
                    notes.resolve(&connection.from_note_id),
                    notes.resolve(&connection.to_note_id),
                ) else {
                    debug!(connection = %connection.id, "Skipping connection with unknown endpoint");
                    skipped.connections += 1;
                    continue;
                };
                let row = to_row(
                    RemoteTable::Connections,
                    &ConnectionRow {
                        id: None,
                        desktop_id: remote_desktop.to_string(),
                        from_note_id: from.to_string(),
                        to_note_id: to.to_string(),
                        color: connection.color.clone(),
                    },
                )
                .map_err(at("upload connections"))?;
                remote
                    .upsert(RemoteTable::Connections, row)
                    .await
                    .map_err(at("upload connections"))?;
                counts.connections += 1;
            }
        }

        Ok((counts, skipped))
    }

    async fn create_remote_version(
        &self,
        remote: &dyn RemoteBackend,
        remote_ws: &str,
        workspace: &Workspace,
        content: &WorkspaceContent,
        counts: &EntityCounts,
    ) -> Result<i64, ServiceError> {
        let stage = "record remote version";
        let latest = remote
            .select(
                RemoteTable::Versions,
                &RowFilter::new()
                    .eq("workspace_id", remote_ws)
                    .order_by("version_number", true)
                    .limit(1),
            )
            .await
            .map_err(at(stage))?;
        let max = match latest.into_iter().next() {
            Some(row) => {
                from_row::<VersionRow>(RemoteTable::Versions, row)
                    .map_err(at(stage))?
                    .version_number
            }
            None => 0,
        };

        let version_number = max + 1;
        let change_summary = format!("Sync: {}", counts);
        let snapshot = WorkspaceSnapshot {
            version_number,
            change_summary: change_summary.clone(),
            captured_at: Utc::now(),
            workspace: workspace.into(),
            content: content.clone(),
        };

        let row = to_row(
            RemoteTable::Versions,
            &VersionRow {
                id: None,
                workspace_id: remote_ws.to_string(),
                version_number,
                snapshot: serde_json::to_value(&snapshot)?,
                change_summary,
            },
        )
        .map_err(at(stage))?;
        remote
            .upsert(RemoteTable::Versions, row)
            .await
            .map_err(at(stage))?;

        Ok(version_number)
    }

    /// Replace all local content with the principal's remote default workspace
    pub async fn pull(&self) -> PullResult {
        let _lease = match self.leases.acquire(LeaseScope::Store) {
            Ok(lease) => lease,
            Err(e) => return PullResult::failed(&e),
        };
        let remote = match self.configured_remote() {
            Ok(remote) => remote,
            Err(e) => {
                self.fail(&e);
                return PullResult::failed(&e);
            }
        };

        self.set_status(SyncStatus::Syncing);
        info!("Pull started");

        match self.pull_inner(remote.as_ref()).await {
            Ok(None) => {
                info!("No remote workspace; nothing to load");
                self.set_status(SyncStatus::Idle);
                PullResult {
                    success: true,
                    loaded: false,
                    ..Default::default()
                }
            }
            Ok(Some(outcome)) => {
                info!(
                    workspace_id = %outcome.workspace_id,
                    counts = %outcome.counts,
                    skipped = outcome.skipped.total(),
                    "Pull completed"
                );
                self.succeed(None);
                PullResult {
                    success: true,
                    loaded: true,
                    workspace_id: Some(outcome.workspace_id),
                    counts: outcome.counts,
                    skipped: outcome.skipped,
                    failure: None,
                    errors: Vec::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Pull failed");
                self.fail(&e);
                PullResult::failed(&e)
            }
        }
    }

    async fn pull_inner(
        &self,
        remote: &dyn RemoteBackend,
    ) -> Result<Option<PullOutcome>, ServiceError> {
        let principal = remote
            .principal()
            .await
            .map_err(at("authenticate"))?
            .ok_or(ServiceError::NotConfigured)?;

        let rows = remote
            .select(
                RemoteTable::Workspaces,
                &RowFilter::new()
                    .eq("user_id", principal.as_str())
                    .eq("is_default", true)
                    .limit(1),
            )
            .await
            .map_err(at("fetch workspace"))?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let ws_row: WorkspaceRow =
            from_row(RemoteTable::Workspaces, row).map_err(at("fetch workspace"))?;
        let remote_ws =
            require_id(RemoteTable::Workspaces, ws_row.id.clone()).map_err(at("fetch workspace"))?;

        let source = self.fetch_remote_content(remote, &remote_ws).await?;

        let mut workspace = Workspace::new(principal, ws_row.name);
        workspace.description = ws_row.description;
        workspace.is_default = ws_row.is_default;
        workspace.theme_config = ws_row.theme_config;

        let replayed = replay(
            &source,
            &ReplayOptions {
                workspace_id: workspace.id.clone(),
                desktop_order: parent_first_order(&source),
                graft: None,
                orphans: OrphanPolicy::AttachToRoot,
            },
        );
        let counts = replayed.content.counts();
        let workspace_id = workspace.id.clone();

        self.store
            .replace_content(workspace, replayed.content, ReloadReason::Pull)
            .await?;

        Ok(Some(PullOutcome {
            workspace_id,
            counts,
            skipped: replayed.skipped,
        }))
    }

    /// Remote workspace content, still keyed by remote ids
    async fn fetch_remote_content(
        &self,
        remote: &dyn RemoteBackend,
        remote_ws: &str,
    ) -> Result<WorkspaceContent, ServiceError> {
        let stage = "fetch remote content";
        let now = Utc::now();
        let mut content = WorkspaceContent::default();

        let desktop_rows = remote
            .select(
                RemoteTable::Desktops,
                &RowFilter::new().eq("workspace_id", remote_ws),
            )
            .await
            .map_err(at(stage))?;

        for row in desktop_rows {
            let d: DesktopRow = from_row(RemoteTable::Desktops, row).map_err(at(stage))?;
            let desktop_id = require_id(RemoteTable::Desktops, d.id).map_err(at(stage))?;
            let by_desktop = RowFilter::new().eq("desktop_id", desktop_id.as_str());

            for row in remote
                .select(RemoteTable::Notes, &by_desktop)
                .await
                .map_err(at(stage))?
            {
                let n: NoteRow = from_row(RemoteTable::Notes, row).map_err(at(stage))?;
                let note_id = require_id(RemoteTable::Notes, n.id).map_err(at(stage))?;

                for row in remote
                    .select(
                        RemoteTable::Assets,
                        &RowFilter::new().eq("note_id", note_id.as_str()),
                    )
                    .await
                    .map_err(at(stage))?
                {
                    let a: AssetRow = from_row(RemoteTable::Assets, row).map_err(at(stage))?;
                    let data = remote
                        .download(&self.asset_bucket, &a.storage_path)
                        .await
                        .map_err(at("download asset payloads"))?;
                    content.assets.push(Asset {
                        id: require_id(RemoteTable::Assets, a.id).map_err(at(stage))?,
                        note_id: note_id.clone(),
                        data,
                        mime_type: a.mime_type,
                        size: Size::new(a.width, a.height),
                        position: Position::new(a.position_x, a.position_y),
                        original_name: a.original_name,
                        created_at: now,
                    });
                }

                content.notes.push(Note {
                    id: note_id,
                    desktop_id: desktop_id.clone(),
                    title: n.title,
                    content: n.content,
                    position: Position::new(n.position_x, n.position_y),
                    size: Size::new(n.width, n.height),
                    z_index: n.z_index,
                    minimized: n.minimized,
                    color: n.color,
                    created_at: now,
                    updated_at: now,
                });
            }

            for row in remote
                .select(RemoteTable::Folders, &by_desktop)
                .await
                .map_err(at(stage))?
            {
                let f: FolderRow = from_row(RemoteTable::Folders, row).map_err(at(stage))?;
                content.folders.push(Folder {
                    id: require_id(RemoteTable::Folders, f.id).map_err(at(stage))?,
                    desktop_id: desktop_id.clone(),
                    target_desktop_id: f.target_desktop_id,
                    name: f.name,
                    icon: f.icon,
                    color: f.color,
                    position: Position::new(f.position_x, f.position_y),
                    created_at: now,
                });
            }

            for row in remote
                .select(RemoteTable::Connections, &by_desktop)
                .await
                .map_err(at(stage))?
            {
                let c: ConnectionRow =
                    from_row(RemoteTable::Connections, row).map_err(at(stage))?;
                content.connections.push(Connection {
                    id: require_id(RemoteTable::Connections, c.id).map_err(at(stage))?,
                    desktop_id: desktop_id.clone(),
                    from_note_id: c.from_note_id,
                    to_note_id: c.to_note_id,
                    color: c.color,
                    created_at: now,
                });
            }

            content.desktops.push(Desktop {
                id: desktop_id,
                workspace_id: remote_ws.to_string(),
                parent_id: d.parent_id,
                name: d.name,
                position_order: d.position_order,
                created_at: now,
            });
        }

        Ok(content)
    }
}

fn ids_of(table: RemoteTable, rows: Vec<Row>) -> Result<Vec<String>, RemoteError> {
    rows.iter().map(|row| row_id(table, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FailurePoint, InMemoryRemote};
    use crate::services::workspace_service::{NewNote, WorkspaceService};

    struct Fixture {
        store: Arc<EntityStore>,
        remote: Arc<InMemoryRemote>,
        leases: OperationLeases,
        sync: SyncEngine,
        workspace_id: String,
    }

    async fn fixture(reset_ms: u64) -> Fixture {
        let store = Arc::new(EntityStore::in_memory());
        let remote = Arc::new(InMemoryRemote::signed_in("user-1"));
        let leases = OperationLeases::new();
        let config = EngineConfig {
            status_reset_delay_ms: reset_ms,
            ..Default::default()
        };

        let service = WorkspaceService::new(store.clone(), &config);
        let (ws, root) = service.create_workspace("user-1", "Home").await.unwrap();
        let child = service.create_desktop(&ws.id, Some(&root.id), "Child").await.unwrap();
        let a = service
            .create_note(&root.id, NewNote::new("a", Position::default()))
            .await
            .unwrap();
        let b = service
            .create_note(&root.id, NewNote::new("b", Position::default()))
            .await
            .unwrap();
        service
            .create_connection(&root.id, &a.id, &b.id, None)
            .await
            .unwrap();
        service
            .create_folder(&root.id, &child.id, "Child", Position::default())
            .await
            .unwrap();
        service
            .add_asset(&a.id, vec![0x89, 0x50], "image/png", None)
            .await
            .unwrap();

        let sync = SyncEngine::new(
            store.clone(),
            Some(remote.clone() as Arc<dyn RemoteBackend>),
            leases.clone(),
            &config,
        );
        Fixture {
            store,
            remote,
            leases,
            sync,
            workspace_id: ws.id,
        }
    }

    #[tokio::test]
    async fn test_push_without_remote_is_not_configured() {
        let store = Arc::new(EntityStore::in_memory());
        let sync = SyncEngine::new(store, None, OperationLeases::new(), &EngineConfig::default());

        let result = sync.push("ws").await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::NotConfigured));
        assert!(matches!(sync.status(), SyncStatus::Error { .. }));

        let pulled = sync.pull().await;
        assert_eq!(pulled.failure, Some(FailureKind::NotConfigured));
    }

    #[tokio::test]
    async fn test_push_replaces_remote_content_and_numbers_versions() {
        let f = fixture(3000).await;

        let first = f.sync.push(&f.workspace_id).await;
        assert!(first.success, "{:?}", first.errors);
        assert_eq!(first.version_number, Some(1));
        assert_eq!(first.counts.desktops, 2);
        assert_eq!(first.counts.notes, 2);
        assert_eq!(first.counts.assets, 1);
        assert_eq!(first.counts.folders, 1);
        assert_eq!(first.counts.connections, 1);
        assert!(f.store.read(|s| s.pending_changes.is_empty()).await);

        let second = f.sync.push(&f.workspace_id).await;
        assert_eq!(second.version_number, Some(2));
        assert_eq!(f.remote.rows(RemoteTable::Workspaces).len(), 1);
        assert_eq!(f.remote.rows(RemoteTable::Desktops).len(), 2);
        assert_eq!(f.remote.rows(RemoteTable::Notes).len(), 2);
        assert_eq!(f.remote.rows(RemoteTable::Versions).len(), 2);
        assert_eq!(f.remote.blob_paths("assets").len(), 1);
    }

    #[tokio::test]
    async fn test_pull_without_remote_workspace_loads_nothing() {
        let store = Arc::new(EntityStore::in_memory());
        let remote: Arc<dyn RemoteBackend> = Arc::new(InMemoryRemote::signed_in("nobody"));
        let sync = SyncEngine::new(
            store.clone(),
            Some(remote),
            OperationLeases::new(),
            &EngineConfig::default(),
        );

        let result = sync.pull().await;
        assert!(result.success);
        assert!(!result.loaded);
        assert_eq!(sync.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_push_then_pull_rebuilds_content_under_new_ids() {
        let f = fixture(3000).await;
        assert!(f.sync.push(&f.workspace_id).await.success);

        let pulled = f.sync.pull().await;
        assert!(pulled.success, "{:?}", pulled.errors);
        assert!(pulled.loaded);
        assert_eq!(pulled.counts.notes, 2);
        assert_eq!(pulled.counts.connections, 1);
        assert!(pulled.skipped.is_empty());

        let new_ws = pulled.workspace_id.unwrap();
        assert_ne!(new_ws, f.workspace_id);
        assert!(f.store.workspace(&f.workspace_id).await.is_none());
        let content = f.store.workspace_content(&new_ws).await;
        assert_eq!(content.assets[0].data, vec![0x89, 0x50]);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_and_sticky() {
        let f = fixture(10).await;
        f.remote.fail_next(FailurePoint::Upsert(RemoteTable::Notes));

        let result = f.sync.push(&f.workspace_id).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::PartialRemoteFailure));
        assert_eq!(result.errors.len(), 1);
        // journal survives a failed push
        assert!(f.store.read(|s| !s.pending_changes.is_empty()).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(f.sync.status(), SyncStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_success_status_reverts_to_idle() {
        let f = fixture(20).await;
        let mut status = f.sync.subscribe_status();

        assert!(f.sync.push(&f.workspace_id).await.success);
        assert_eq!(
            *status.borrow_and_update(),
            SyncStatus::Synced { version: Some(1) }
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.sync.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_overlapping_push_is_busy() {
        let f = fixture(3000).await;
        let _held = f.leases.acquire_workspace(&f.workspace_id).unwrap();

        let result = f.sync.push(&f.workspace_id).await;
        assert_eq!(result.failure, Some(FailureKind::Busy));
        assert_eq!(f.sync.status(), SyncStatus::Idle);
    }
}
