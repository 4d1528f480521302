//! Typed views of remote rows
//!
//! Column names follow the remote schema (snake_case, flattened geometry).
//! Rows are decoded leniently: columns the engine does not use (timestamps,
//! soft-delete markers) are ignored.

use super::{RemoteError, RemoteTable, Row};
use crate::models::ThemeConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub theme_config: ThemeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub workspace_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub position_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub desktop_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub note_id: String,
    pub storage_path: String,
    pub mime_type: String,
    #[serde(default)]
    pub original_name: Option<String>,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub desktop_id: String,
    pub target_desktop_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub desktop_id: String,
    pub from_note_id: String,
    pub to_note_id: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub workspace_id: String,
    pub version_number: i64,
    pub snapshot: serde_json::Value,
    #[serde(default)]
    pub change_summary: String,
}

pub fn to_row<T: Serialize>(table: RemoteTable, value: &T) -> Result<Row, RemoteError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(RemoteError::decode(
            table,
            format!("expected an object, got {}", other),
        )),
        Err(e) => Err(RemoteError::decode(table, e.to_string())),
    }
}

pub fn from_row<T: DeserializeOwned>(table: RemoteTable, row: Row) -> Result<T, RemoteError> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| RemoteError::decode(table, e.to_string()))
}

/// The `id` column of a stored row
pub fn row_id(table: RemoteTable, row: &Row) -> Result<String, RemoteError> {
    row.get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::decode(table, "row has no string id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_rows_omit_id() {
        let row = to_row(
            RemoteTable::Desktops,
            &DesktopRow {
                id: None,
                workspace_id: "w1".into(),
                parent_id: None,
                name: "Root".into(),
                position_order: 0,
            },
        )
        .unwrap();

        assert!(!row.contains_key("id"));
        assert_eq!(row["parent_id"], json!(null));
    }

    #[test]
    fn test_decode_ignores_extra_columns() {
        let row = json!({
            "id": "n1",
            "desktop_id": "d1",
            "title": "Hello",
            "position_x": 10,
            "position_y": 20,
            "width": 250,
            "height": 200,
            "created_at": "2024-01-01T00:00:00Z"
        });
        let note: NoteRow =
            from_row(RemoteTable::Notes, row.as_object().cloned().unwrap()).unwrap();

        assert_eq!(note.id.as_deref(), Some("n1"));
        assert_eq!(note.position_x, 10.0);
        assert!(!note.minimized);
    }

    #[test]
    fn test_decode_reports_table() {
        let err = from_row::<FolderRow>(RemoteTable::Folders, Row::new()).unwrap_err();
        assert!(matches!(err, RemoteError::Decode { table: RemoteTable::Folders, .. }));
    }
}
