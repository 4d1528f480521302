use super::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of local mutation awaiting sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One outstanding local mutation; at most one exists per `entity_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PendingChange {
    pub id: String,
    pub kind: ChangeKind,
    pub entity_type: EntityKind,
    pub entity_id: String,

    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

impl PendingChange {
    pub fn new(
        kind: ChangeKind,
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            entity_type,
            entity_id: entity_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}
