use super::geometry::{Position, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An image attached to a note; deleted with its owning note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Asset {
    pub id: String,
    pub note_id: String,

    /// Raw image bytes (base64 in every JSON representation)
    #[serde(with = "super::binary")]
    pub data: Vec<u8>,

    pub mime_type: String,

    /// Rendered size inside the note
    pub size: Size,

    /// Position relative to the note
    #[serde(default)]
    pub position: Position,

    #[serde(default)]
    pub original_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(note_id: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            note_id: note_id.into(),
            data,
            mime_type: mime_type.into(),
            size: Size::new(200.0, 150.0),
            position: Position::default(),
            original_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// File extension derived from the MIME subtype (`image/png` -> `png`)
    pub fn extension(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(_, sub)| sub.split('+').next().unwrap_or(sub))
            .filter(|sub| !sub.is_empty())
            .unwrap_or("bin")
    }
}
