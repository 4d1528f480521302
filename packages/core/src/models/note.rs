use super::geometry::{Position, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A movable note on a desktop
///
/// `z_index` is only a stacking hint; several notes may share a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Note {
    pub id: String,
    pub desktop_id: String,
    pub title: String,

    #[serde(default)]
    pub content: String,

    pub position: Position,

    #[serde(default)]
    pub size: Size,

    #[serde(default)]
    pub z_index: i64,

    #[serde(default)]
    pub minimized: bool,

    #[serde(default)]
    pub color: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(desktop_id: impl Into<String>, title: impl Into<String>, position: Position) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            desktop_id: desktop_id.into(),
            title: title.into(),
            content: String::new(),
            position,
            size: Size::default(),
            z_index: 0,
            minimized: false,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Sparse note update; `None` leaves a field unchanged
///
/// `color` uses the double-Option pattern: `Some(None)` clears the color.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub minimized: Option<bool>,
    pub color: Option<Option<String>>,
}

impl NoteUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = Some(color);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
