//! Remote Store Interface
//!
//! The relational store and blob bucket on the other side of push and pull.
//! The engine only needs row-level select/upsert/update/delete with simple
//! equality filters, plus blob upload/download/remove; anything offering those
//! (a hosted Postgres REST gateway, a test double) can implement
//! [`RemoteBackend`].
//!
//! Rows are plain JSON objects using the remote column names; [`rows`] holds
//! the typed views the sync engine reads and writes.

mod error;
mod memory;
pub mod rows;

pub use error::RemoteError;
pub use memory::{FailurePoint, InMemoryRemote};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// One remote row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteTable {
    Workspaces,
    Desktops,
    Notes,
    Assets,
    Folders,
    Connections,
    Versions,
}

impl RemoteTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteTable::Workspaces => "workspaces",
            RemoteTable::Desktops => "desktops",
            RemoteTable::Notes => "notes",
            RemoteTable::Assets => "assets",
            RemoteTable::Folders => "folders",
            RemoteTable::Connections => "connections",
            RemoteTable::Versions => "versions",
        }
    }
}

impl fmt::Display for RemoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq(column, value) => row.get(column) == Some(value),
            Condition::In(column, values) => row
                .get(column)
                .map_or(false, |actual| values.contains(actual)),
            Condition::IsNull(column) => row.get(column).map_or(true, Value::is_null),
        }
    }
}

/// Conjunction of column conditions with optional ordering and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    pub conditions: Vec<Condition>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::IsNull(column.into()));
        self
    }

    /// Sort by `column`, descending when `descending` is set
    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some((column.into(), descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Remote relational store plus blob storage
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Id of the authenticated principal, `None` when signed out
    async fn principal(&self) -> Result<Option<String>, RemoteError>;

    async fn select(&self, table: RemoteTable, filter: &RowFilter) -> Result<Vec<Row>, RemoteError>;

    /// Insert or replace a row by `id`, assigning an id when the row has none.
    /// Returns the stored row.
    async fn upsert(&self, table: RemoteTable, row: Row) -> Result<Row, RemoteError>;

    /// Merge `patch` into every matching row, returning how many matched
    async fn update(
        &self,
        table: RemoteTable,
        filter: &RowFilter,
        patch: Row,
    ) -> Result<usize, RemoteError>;

    async fn delete(&self, table: RemoteTable, filter: &RowFilter) -> Result<usize, RemoteError>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError>;

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, RemoteError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_conditions() {
        let r = row(json!({"id": "a", "workspace_id": "w1", "parent_id": null}));

        assert!(RowFilter::new().matches(&r));
        assert!(RowFilter::new().eq("workspace_id", "w1").is_null("parent_id").matches(&r));
        assert!(!RowFilter::new().eq("workspace_id", "w2").matches(&r));
        assert!(RowFilter::new().is_in("id", ["a", "b"]).matches(&r));
        assert!(!RowFilter::new().is_in("id", Vec::<String>::new()).matches(&r));
        assert!(RowFilter::new().is_null("missing").matches(&r));
    }
}
