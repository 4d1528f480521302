use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in the workspace's parent-pointer tree of desktops
///
/// `parent_id = None` marks the workspace root. Notes, folders and
/// connections are owned by exactly one desktop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Desktop {
    pub id: String,
    pub workspace_id: String,
    pub parent_id: Option<String>,
    pub name: String,

    /// Sibling ordering hint (remote `position_order`)
    #[serde(default)]
    pub position_order: i64,

    pub created_at: DateTime<Utc>,
}

impl Desktop {
    pub fn new(
        workspace_id: impl Into<String>,
        parent_id: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            parent_id,
            name: name.into(),
            position_order: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
