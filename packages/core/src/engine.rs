//! Engine facade
//!
//! Wires one [`EntityStore`] and one [`OperationLeases`] registry into every
//! service. Construct it once per process (or per test).

use crate::config::EngineConfig;
use crate::db::{ChangeJournal, EntityStore, LibsqlKv};
use crate::remote::RemoteBackend;
use crate::services::{
    OperationLeases, PortableCodec, SyncEngine, VersionManager, WorkspaceService,
};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub struct DeskflowEngine {
    config: EngineConfig,
    store: Arc<EntityStore>,
    leases: OperationLeases,
    journal: ChangeJournal,
    workspaces: WorkspaceService,
    sync: SyncEngine,
    versions: VersionManager,
    portable: PortableCodec,
}

impl DeskflowEngine {
    /// Open the engine on the libsql database named by `config`
    pub async fn open(
        config: EngineConfig,
        remote: Option<Arc<dyn RemoteBackend>>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid engine configuration: {}", e))?;
        let db_path = config
            .resolve_database_path()
            .context("failed to resolve database path")?;

        let backend = LibsqlKv::new(db_path.clone())
            .await
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        let store = EntityStore::open(Arc::new(backend))
            .await
            .context("failed to load local state")?;

        info!(path = %db_path.display(), remote = remote.is_some(), "Engine opened");
        Ok(Self::assemble(config, Arc::new(store), remote))
    }

    /// Engine over a volatile in-memory store
    pub fn in_memory(config: EngineConfig, remote: Option<Arc<dyn RemoteBackend>>) -> Self {
        Self::assemble(config, Arc::new(EntityStore::in_memory()), remote)
    }

    fn assemble(
        config: EngineConfig,
        store: Arc<EntityStore>,
        remote: Option<Arc<dyn RemoteBackend>>,
    ) -> Self {
        let leases = OperationLeases::new();
        Self {
            journal: ChangeJournal::new(store.clone()),
            workspaces: WorkspaceService::new(store.clone(), &config),
            sync: SyncEngine::new(store.clone(), remote, leases.clone(), &config),
            versions: VersionManager::new(store.clone(), leases.clone(), &config),
            portable: PortableCodec::new(store.clone(), leases.clone(), &config),
            store,
            leases,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn leases(&self) -> &OperationLeases {
        &self.leases
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.journal
    }

    pub fn workspaces(&self) -> &WorkspaceService {
        &self.workspaces
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn portable(&self) -> &PortableCodec {
        &self.portable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemote;

    #[tokio::test]
    async fn test_components_share_one_store() {
        let remote = Arc::new(InMemoryRemote::signed_in("user-1"));
        let engine = DeskflowEngine::in_memory(EngineConfig::default(), Some(remote));
        assert!(engine.sync().is_configured());

        let (ws, _) = engine
            .workspaces()
            .create_workspace("user-1", "Home")
            .await
            .unwrap();
        assert_eq!(engine.journal().len().await, 2);

        let version = engine.versions().create_snapshot(&ws.id, None).await.unwrap();
        assert_eq!(version.version_number, 1);
        assert!(engine.store().version(&version.id).await.is_some());
    }
}
