//! Version Manager
//!
//! Immutable, monotonically numbered snapshots of a workspace's full content.
//! Restoring a snapshot wipes the local content and replays the snapshot under
//! fresh entity ids; the version records themselves are never modified.

use crate::config::EngineConfig;
use crate::db::{EntityStore, ReloadReason, StoreEvent};
use crate::models::{
    EntityCounts, EntityKind, SkipCounts, Version, Workspace, WorkspaceHeader, WorkspaceSnapshot,
};
use crate::services::error::{FailureKind, ServiceError};
use crate::services::lease::{LeaseScope, OperationLeases};
use crate::services::replay::{parent_first_order, replay, OrphanPolicy, ReplayOptions};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub success: bool,
    pub workspace_id: Option<String>,
    pub version_number: Option<i64>,
    pub counts: EntityCounts,
    pub skipped: SkipCounts,
    pub failure: Option<FailureKind>,
    pub errors: Vec<String>,
}

/// Ids present in one snapshot but not the other
///
/// `modified` is always `None`: entities are compared by presence only, never
/// by content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDiff {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Option<usize>,
}

impl KindDiff {
    fn between(from: &HashSet<String>, to: &HashSet<String>) -> Self {
        let mut added: Vec<String> = to.difference(from).cloned().collect();
        let mut deleted: Vec<String> = from.difference(to).cloned().collect();
        added.sort();
        deleted.sort();
        Self {
            added,
            deleted,
            modified: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub desktops: KindDiff,
    pub notes: KindDiff,
    pub assets: KindDiff,
    pub folders: KindDiff,
    pub connections: KindDiff,
}

pub struct VersionManager {
    store: Arc<EntityStore>,
    leases: OperationLeases,
    default_limit: usize,
}

impl VersionManager {
    pub fn new(store: Arc<EntityStore>, leases: OperationLeases, config: &EngineConfig) -> Self {
        Self {
            store,
            leases,
            default_limit: config.default_version_limit,
        }
    }

    /// Capture the workspace's full content as the next version
    ///
    /// Versions are not deduplicated: snapshotting unchanged content twice
    /// yields two versions.
    pub async fn create_snapshot(
        &self,
        workspace_id: &str,
        summary: Option<&str>,
    ) -> Result<Version, ServiceError> {
        let _lease = self.leases.acquire_workspace(workspace_id)?;

        let version = self
            .store
            .batch(|s| {
                let workspace = s
                    .workspaces
                    .get(workspace_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Workspace, workspace_id))?;
                let content = s.workspace_content(workspace_id);
                let version_number = s.max_version_number(workspace_id) + 1;
                let change_summary = summary
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Snapshot {}: {}", version_number, content.counts()));

                let snapshot = WorkspaceSnapshot {
                    version_number,
                    change_summary: change_summary.clone(),
                    captured_at: Utc::now(),
                    workspace: WorkspaceHeader::from(workspace),
                    content,
                };
                let version = Version {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace_id.to_string(),
                    version_number,
                    snapshot: serde_json::to_string(&snapshot)?,
                    change_summary,
                    created_at: snapshot.captured_at,
                };
                s.versions.insert(version.id.clone(), version.clone());
                Ok::<_, ServiceError>(version)
            })
            .await?;

        info!(
            workspace_id,
            version = version.version_number,
            "Created snapshot"
        );
        self.store.notify(StoreEvent::EntityPut {
            kind: EntityKind::Version,
            id: version.id.clone(),
        });
        Ok(version)
    }

    /// Newest first, at most `limit` (or the configured default)
    pub async fn list_versions(&self, workspace_id: &str, limit: Option<usize>) -> Vec<Version> {
        let limit = limit.unwrap_or(self.default_limit);
        let mut versions: Vec<Version> = self
            .store
            .read(|s| {
                s.versions
                    .values()
                    .filter(|v| v.workspace_id == workspace_id)
                    .cloned()
                    .collect()
            })
            .await;
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        versions.truncate(limit);
        versions
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Version, ServiceError> {
        self.store
            .version(version_id)
            .await
            .ok_or_else(|| ServiceError::not_found(EntityKind::Version, version_id))
    }

    pub async fn latest_version(&self, workspace_id: &str) -> Option<Version> {
        self.list_versions(workspace_id, Some(1)).await.into_iter().next()
    }

    /// Replace all local content with the content of `version_id`
    ///
    /// The workspace keeps the snapshot's workspace id, so later snapshots keep
    /// numbering after the existing versions. Every desktop, note, asset,
    /// folder and connection gets a fresh id.
    pub async fn restore(&self, version_id: &str) -> RestoreResult {
        match self.restore_inner(version_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(version_id, error = %e, "Restore failed");
                RestoreResult {
                    success: false,
                    failure: Some(e.kind()),
                    errors: vec![e.to_string()],
                    ..Default::default()
                }
            }
        }
    }

    async fn restore_inner(&self, version_id: &str) -> Result<RestoreResult, ServiceError> {
        let _lease = self.leases.acquire(LeaseScope::Store)?;

        let version = self.get_version(version_id).await?;
        let snapshot = version.parse_snapshot().map_err(|e| {
            ServiceError::malformed(format!(
                "snapshot of version {} is unreadable: {}",
                version.version_number, e
            ))
        })?;

        let header = snapshot.workspace;
        let now = Utc::now();
        let workspace = Workspace {
            id: header.id,
            owner_id: header.owner_id,
            name: header.name,
            description: header.description,
            is_default: true,
            theme_config: header.theme_config,
            created_at: now,
            updated_at: now,
        };

        let replayed = replay(
            &snapshot.content,
            &ReplayOptions {
                workspace_id: workspace.id.clone(),
                desktop_order: parent_first_order(&snapshot.content),
                graft: None,
                orphans: OrphanPolicy::Skip,
            },
        );
        let counts = replayed.content.counts();
        let workspace_id = workspace.id.clone();

        self.store
            .replace_content(workspace, replayed.content, ReloadReason::Restore)
            .await?;

        info!(
            version_id,
            version = version.version_number,
            %counts,
            skipped = replayed.skipped.total(),
            "Restored snapshot"
        );

        Ok(RestoreResult {
            success: true,
            workspace_id: Some(workspace_id),
            version_number: Some(version.version_number),
            counts,
            skipped: replayed.skipped,
            failure: None,
            errors: Vec::new(),
        })
    }

    /// Entity ids added and deleted between two snapshots
    pub async fn diff(&self, from_id: &str, to_id: &str) -> Result<VersionDiff, ServiceError> {
        let from = self.get_version(from_id).await?;
        let to = self.get_version(to_id).await?;
        let from_ids = from.parse_snapshot()?.content.id_sets();
        let to_ids = to.parse_snapshot()?.content.id_sets();

        Ok(VersionDiff {
            from_version: from.version_number,
            to_version: to.version_number,
            desktops: KindDiff::between(&from_ids.desktops, &to_ids.desktops),
            notes: KindDiff::between(&from_ids.notes, &to_ids.notes),
            assets: KindDiff::between(&from_ids.assets, &to_ids.assets),
            folders: KindDiff::between(&from_ids.folders, &to_ids.folders),
            connections: KindDiff::between(&from_ids.connections, &to_ids.connections),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Desktop, Note, Position};

    async fn seeded() -> (Arc<EntityStore>, VersionManager, Workspace, Desktop) {
        let store = Arc::new(EntityStore::in_memory());
        let manager = VersionManager::new(
            Arc::clone(&store),
            OperationLeases::new(),
            &EngineConfig::default(),
        );
        let ws = Workspace::new("user-1", "Main");
        let root = Desktop::new(ws.id.clone(), None, "root");
        store.put(ws.clone().into()).await.unwrap();
        store.put(root.clone().into()).await.unwrap();
        (store, manager, ws, root)
    }

    #[tokio::test]
    async fn test_version_numbers_are_per_workspace() {
        let (store, manager, ws, _) = seeded().await;
        let other = Workspace::new("user-1", "Other");
        store.put(other.clone().into()).await.unwrap();

        manager.create_snapshot(&other.id, None).await.unwrap();
        manager.create_snapshot(&other.id, None).await.unwrap();
        let first = manager.create_snapshot(&ws.id, None).await.unwrap();
        let second = manager.create_snapshot(&ws.id, Some("manual")).await.unwrap();

        assert_eq!(first.version_number, 1);
        assert_eq!(second.version_number, 2);
        assert_eq!(second.change_summary, "manual");
        assert_eq!(manager.latest_version(&ws.id).await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_limited() {
        let (_, manager, ws, _) = seeded().await;
        for _ in 0..3 {
            manager.create_snapshot(&ws.id, None).await.unwrap();
        }

        let numbers: Vec<i64> = manager
            .list_versions(&ws.id, Some(2))
            .await
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_workspace_is_not_found() {
        let (_, manager, _, _) = seeded().await;
        let err = manager.create_snapshot("missing", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { kind: EntityKind::Workspace, .. }));
    }

    #[tokio::test]
    async fn test_diff_reports_presence_only() {
        let (store, manager, ws, root) = seeded().await;
        let v1 = manager.create_snapshot(&ws.id, None).await.unwrap();
        let note = Note::new(root.id.clone(), "n1", Position::new(100.0, 100.0));
        store.put(note.clone().into()).await.unwrap();
        let v2 = manager.create_snapshot(&ws.id, None).await.unwrap();

        let diff = manager.diff(&v1.id, &v2.id).await.unwrap();
        assert_eq!(diff.notes.added, vec![note.id]);
        assert!(diff.desktops.is_empty());
        assert_eq!(diff.notes.modified, None);
    }

    #[tokio::test]
    async fn test_restore_of_corrupt_snapshot_fails_cleanly() {
        let (store, manager, ws, root) = seeded().await;
        let mut version = manager.create_snapshot(&ws.id, None).await.unwrap();
        version.snapshot = "{not json".to_string();
        store.put(version.clone().into()).await.unwrap();

        let result = manager.restore(&version.id).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::MalformedInput));
        assert!(store.desktop(&root.id).await.is_some());
    }
}
