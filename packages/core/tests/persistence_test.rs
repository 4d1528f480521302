//! Persistence Tests
//!
//! The whole local state lives in one libsql row; these tests reopen the
//! database file to check that every committed batch survives, and that a
//! failed write leaves both memory and disk untouched.

#[cfg(test)]
mod persistence_tests {
    use anyhow::Result;
    use deskflow_core::db::{
        EntityStore, KeyValueBackend, LibsqlKv, MemoryKv, StoreEvent, STATE_KEY,
    };
    use deskflow_core::{DeskflowEngine, EngineConfig, EntityKind, NewNote, Position};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    fn config_in(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            database_path: Some(dir.path().join("nested").join("deskflow.db")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let (ws_id, note_id, version_id) = {
            let engine = DeskflowEngine::open(config_in(&temp_dir), None).await?;
            let (ws, root) = engine.workspaces().create_workspace("user-1", "Disk").await?;
            let note = engine
                .workspaces()
                .create_note(&root.id, NewNote::new("persisted", Position::new(7.0, 8.0)))
                .await?;
            let version = engine.versions().create_snapshot(&ws.id, None).await?;
            (ws.id, note.id, version.id)
        };

        let engine = DeskflowEngine::open(config_in(&temp_dir), None).await?;
        let note = engine.store().note(&note_id).await.expect("note reloaded");
        assert_eq!(note.title, "persisted");
        assert_eq!(note.position, Position::new(7.0, 8.0));
        assert!(engine.store().workspace(&ws_id).await.is_some());
        assert!(engine.store().version(&version_id).await.is_some());
        assert_eq!(engine.journal().len().await, 3);

        let next = engine.versions().create_snapshot(&ws_id, None).await?;
        assert_eq!(next.version_number, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_libsql_backend_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let kv = LibsqlKv::new(temp_dir.path().join("kv.db")).await?;

        assert_eq!(kv.get("missing").await?, None);
        kv.put("k", b"one".to_vec()).await?;
        kv.put("k", b"two".to_vec()).await?;
        assert_eq!(kv.get("k").await?, Some(b"two".to_vec()));
        assert!(kv.delete("k").await?);
        assert!(!kv.delete("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_changes_nothing() -> Result<()> {
        let backend = Arc::new(MemoryKv::new());
        let store = Arc::new(EntityStore::open(backend.clone()).await?);
        let mut events = store.subscribe();

        let ws = deskflow_core::Workspace::new("user-1", "W");
        store.put(ws.clone().into()).await?;
        let event = timeout(Duration::from_secs(1), events.recv()).await??;
        assert_eq!(
            event,
            StoreEvent::EntityPut {
                kind: EntityKind::Workspace,
                id: ws.id.clone()
            }
        );

        let persisted = backend.get(STATE_KEY).await?;
        let revision = store.revision().await;

        backend.set_fail_writes(true);
        assert!(store.delete(EntityKind::Workspace, &ws.id).await.is_err());
        assert!(store.workspace(&ws.id).await.is_some());
        assert_eq!(store.revision().await, revision);
        assert_eq!(backend.get(STATE_KEY).await?, persisted);
        assert!(events.try_recv().is_err());
        Ok(())
    }
}
