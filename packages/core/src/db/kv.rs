//! Key-value persistence seam
//!
//! The entity store persists its whole state as one value under one key. Any
//! backend that offers atomic get/put/delete per key can host it.

use crate::db::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Local persistence collaborator: bytes by key, atomic per key
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Returns whether a value was removed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// In-process backend for tests and ephemeral engines
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put`/`delete` fail (simulates a full disk)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("write rejected by memory backend"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StoreError::backend("Failed to acquire lock"))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::backend("Failed to acquire lock"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::backend("Failed to acquire lock"))?;
        Ok(values.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_kv_round_trip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.put("a", b"one".to_vec()).await.unwrap();
        kv.put("a", b"two".to_vec()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"two".to_vec()));

        assert!(kv.delete("a").await.unwrap());
        assert!(!kv.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_writes_leave_value_untouched() {
        let kv = MemoryKv::new();
        kv.put("a", b"one".to_vec()).await.unwrap();
        kv.set_fail_writes(true);

        assert!(kv.put("a", b"two".to_vec()).await.is_err());
        assert_eq!(kv.get("a").await.unwrap(), Some(b"one".to_vec()));
    }
}
