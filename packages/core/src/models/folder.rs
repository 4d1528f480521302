use super::geometry::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shortcut on a desktop that navigates to another desktop
///
/// The folder owns its target: deleting the folder deletes the target desktop
/// and all of its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Folder {
    pub id: String,

    /// Desktop the folder is shown on
    pub desktop_id: String,

    /// Desktop the folder opens
    pub target_desktop_id: String,

    pub name: String,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub color: Option<String>,

    pub position: Position,

    pub created_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(
        desktop_id: impl Into<String>,
        target_desktop_id: impl Into<String>,
        name: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            desktop_id: desktop_id.into(),
            target_desktop_id: target_desktop_id.into(),
            name: name.into(),
            icon: None,
            color: None,
            position,
            created_at: Utc::now(),
        }
    }
}
