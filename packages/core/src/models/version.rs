use super::WorkspaceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable, monotonically numbered capture of a workspace's content
///
/// `snapshot` holds the serialized [`WorkspaceSnapshot`] exactly as written at
/// creation time. Nothing in the engine rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Version {
    pub id: String,
    pub workspace_id: String,
    pub version_number: i64,
    pub snapshot: String,
    pub change_summary: String,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn parse_snapshot(&self) -> Result<WorkspaceSnapshot, serde_json::Error> {
        serde_json::from_str(&self.snapshot)
    }
}
