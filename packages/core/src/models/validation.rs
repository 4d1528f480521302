//! Field validation shared by every entity kind
//!
//! Limits mirror the remote schema (varchar widths, asset size cap) so that a
//! workspace that validates locally can always be pushed.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum length of a note title
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length of a workspace, desktop or folder name
pub const MAX_NAME_LEN: usize = 100;

/// Maximum length of note content
pub const MAX_CONTENT_LEN: usize = 100_000;

/// Maximum size of a single asset payload (5 MiB)
pub const MAX_ASSET_BYTES: usize = 5 * 1024 * 1024;

/// Validation errors for entity fields
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' exceeds {max} characters")]
    TooLong { field: String, max: usize },

    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    #[error("Unsupported asset type '{0}': only images are accepted")]
    UnsupportedMimeType(String),

    #[error("Asset payload of {size} bytes exceeds the {max} byte limit")]
    AssetTooLarge { size: usize, max: usize },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}

fn color_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").ok())
        .as_ref()
}

/// Trim a required text field and enforce its maximum length
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(trimmed.to_string())
}

/// Enforce the maximum length of an optional/free text field
pub fn bounded_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

pub fn color(value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(c) if !color_pattern().is_some_and(|re| re.is_match(c)) => {
            Err(ValidationError::InvalidColor(c.to_string()))
        }
        _ => Ok(()),
    }
}

/// Only image payloads within `max` bytes are accepted as assets
pub fn image_payload(mime_type: &str, size: usize, max: usize) -> Result<(), ValidationError> {
    if !mime_type.starts_with("image/") {
        return Err(ValidationError::UnsupportedMimeType(mime_type.to_string()));
    }
    if size > max {
        return Err(ValidationError::AssetTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_trims_and_limits() {
        assert_eq!(required_text("title", "  Hello ", 10).unwrap(), "Hello");
        assert_eq!(
            required_text("title", "   ", 10),
            Err(ValidationError::MissingField("title".to_string()))
        );
        assert!(matches!(
            required_text("name", &"x".repeat(101), MAX_NAME_LEN),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
    }

    #[test]
    fn test_color_format() {
        assert!(color(None).is_ok());
        assert!(color(Some("#00ff41")).is_ok());
        assert!(color(Some("#00FF4")).is_err());
        assert!(color(Some("green")).is_err());
    }

    #[test]
    fn test_image_payload_limits() {
        assert!(image_payload("image/png", 10, MAX_ASSET_BYTES).is_ok());
        assert_eq!(
            image_payload("application/pdf", 10, MAX_ASSET_BYTES),
            Err(ValidationError::UnsupportedMimeType("application/pdf".to_string()))
        );
        assert!(matches!(
            image_payload("image/png", MAX_ASSET_BYTES + 1, MAX_ASSET_BYTES),
            Err(ValidationError::AssetTooLarge { .. })
        ));
    }
}
