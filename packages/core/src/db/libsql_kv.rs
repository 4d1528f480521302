//! libsql-backed key-value store
//!
//! Hosts the entity store's state blob in an embedded libsql database file.
//!
//! # Database Connection Pattern
//!
//! Every operation opens its own connection through `connect_with_timeout()`.
//! SQLite connections must not be reused across `.await` points that may move
//! the future to another runtime thread; the 5-second busy timeout lets
//! concurrent writers wait instead of failing with `SQLITE_BUSY`.

use crate::db::kv::KeyValueBackend;
use crate::db::StoreError;
use async_trait::async_trait;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LibsqlKv {
    db: Arc<Database>,
    db_path: PathBuf,
}

impl LibsqlKv {
    /// Open (or create) the database file and ensure the `kv_store` table exists
    ///
    /// # Errors
    ///
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        StoreError::permission_denied(db_path.clone())
                    } else {
                        StoreError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let kv = Self {
            db: Arc::new(db),
            db_path,
        };
        kv.initialize_schema().await?;
        Ok(kv)
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// PRAGMA statements return rows, so they go through `query()`
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), StoreError> {
        let mut stmt = conn
            .prepare(pragma)
            .await
            .map_err(|e| StoreError::backend(format!("Failed to execute '{}': {}", pragma, e)))?;
        let _ = stmt
            .query(())
            .await
            .map_err(|e| StoreError::backend(format!("Failed to execute '{}': {}", pragma, e)))?;
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            (),
        )
        .await
        .map_err(|e| StoreError::backend(format!("Failed to create kv_store table: {}", e)))?;

        Ok(())
    }

    async fn connect_with_timeout(&self) -> Result<libsql::Connection, StoreError> {
        let conn = self.db.connect().map_err(StoreError::LibsqlError)?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }
}

#[async_trait]
impl KeyValueBackend for LibsqlKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE key = ?")
            .await
            .map_err(|e| StoreError::backend(format!("Failed to prepare get query: {}", e)))?;

        let mut rows = stmt
            .query([key])
            .await
            .map_err(|e| StoreError::backend(format!("Failed to execute get query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::backend(e.to_string()))?
        {
            Some(row) => {
                let value: Vec<u8> = row
                    .get(0)
                    .map_err(|e| StoreError::backend(format!("Failed to read value: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            (key, libsql::Value::Blob(value)),
        )
        .await
        .map_err(|e| StoreError::backend(format!("Failed to write key '{}': {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.connect_with_timeout().await?;

        let affected = conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .await
            .map_err(|e| StoreError::backend(format!("Failed to delete key '{}': {}", key, e)))?;

        Ok(affected > 0)
    }
}
