//! In-process remote store
//!
//! Complete [`RemoteBackend`] over in-memory tables and a blob map, with a
//! switchable principal and one-shot failure injection. Used by the tests and
//! by the dev tools when no hosted backend is configured.

use super::{RemoteBackend, RemoteError, RemoteTable, Row, RowFilter};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Operation that should fail the next time it runs
#[derive(Debug, Clone, PartialEq)]
pub enum FailurePoint {
    Select(RemoteTable),
    Upsert(RemoteTable),
    Update(RemoteTable),
    Delete(RemoteTable),
    Upload,
    Download,
}

#[derive(Default)]
struct RemoteData {
    tables: HashMap<RemoteTable, Vec<Row>>,
    blobs: HashMap<(String, String), Vec<u8>>,
    principal: Option<String>,
    failure: Option<FailurePoint>,
}

#[derive(Default)]
pub struct InMemoryRemote {
    data: Mutex<RemoteData>,
}

impl InMemoryRemote {
    /// Remote with no authenticated principal
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(principal: impl Into<String>) -> Self {
        let remote = Self::new();
        remote.set_principal(Some(principal.into()));
        remote
    }

    pub fn set_principal(&self, principal: Option<String>) {
        if let Ok(mut data) = self.data.lock() {
            data.principal = principal;
        }
    }

    /// Fail the next operation matching `point`
    pub fn fail_next(&self, point: FailurePoint) {
        if let Ok(mut data) = self.data.lock() {
            data.failure = Some(point);
        }
    }

    /// Every row of `table`, in insertion order
    pub fn rows(&self, table: RemoteTable) -> Vec<Row> {
        self.data
            .lock()
            .map(|data| data.tables.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn blob_paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .data
            .lock()
            .map(|data| {
                data.blobs
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RemoteData>, RemoteError> {
        self.data
            .lock()
            .map_err(|_| RemoteError::storage("memory", "Failed to acquire lock"))
    }

    fn check_failure(
        data: &mut RemoteData,
        point: FailurePoint,
        error: impl FnOnce() -> RemoteError,
    ) -> Result<(), RemoteError> {
        if data.failure.as_ref() == Some(&point) {
            data.failure = None;
            return Err(error());
        }
        Ok(())
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), Some(v)) if !v.is_null() => Ordering::Less,
        (Some(v), None | Some(Value::Null)) if !v.is_null() => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RemoteBackend for InMemoryRemote {
    async fn principal(&self) -> Result<Option<String>, RemoteError> {
        Ok(self.lock()?.principal.clone())
    }

    async fn select(&self, table: RemoteTable, filter: &RowFilter) -> Result<Vec<Row>, RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Select(table), || {
            RemoteError::request(table, "injected select failure")
        })?;

        let mut rows: Vec<Row> = data
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, descending)) = &filter.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn upsert(&self, table: RemoteTable, mut row: Row) -> Result<Row, RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Upsert(table), || {
            RemoteError::request(table, "injected upsert failure")
        })?;

        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let rows = data.tables.entry(table).or_default();
        match rows
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(row)
    }

    async fn update(
        &self,
        table: RemoteTable,
        filter: &RowFilter,
        patch: Row,
    ) -> Result<usize, RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Update(table), || {
            RemoteError::request(table, "injected update failure")
        })?;

        let mut updated = 0;
        if let Some(rows) = data.tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: RemoteTable, filter: &RowFilter) -> Result<usize, RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Delete(table), || {
            RemoteError::request(table, "injected delete failure")
        })?;

        let Some(rows) = data.tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok(before - rows.len())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Upload, || {
            RemoteError::storage(path, "injected upload failure")
        })?;
        data.blobs
            .insert((bucket.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut data = self.lock()?;
        Self::check_failure(&mut data, FailurePoint::Download, || {
            RemoteError::storage(path, "injected download failure")
        })?;
        data.blobs
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::storage(path, "object not found"))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), RemoteError> {
        let mut data = self.lock()?;
        for path in paths {
            data.blobs.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }
}
