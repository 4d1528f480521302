use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default line color for new connections
pub const DEFAULT_CONNECTION_COLOR: &str = "#00ff41";

/// A visual edge between two notes on the same desktop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Connection {
    pub id: String,
    pub desktop_id: String,
    pub from_note_id: String,
    pub to_note_id: String,

    #[serde(default)]
    pub color: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        desktop_id: impl Into<String>,
        from_note_id: impl Into<String>,
        to_note_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            desktop_id: desktop_id.into(),
            from_note_id: from_note_id.into(),
            to_note_id: to_note_id.into(),
            color: Some(DEFAULT_CONNECTION_COLOR.to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn touches(&self, note_id: &str) -> bool {
        self.from_note_id == note_id || self.to_note_id == note_id
    }
}
