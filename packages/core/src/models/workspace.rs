use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visual theme stored with each workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    pub primary_color: String,
    pub glow_intensity: f64,
    pub particles_enabled: bool,
    pub animations_enabled: bool,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#00ff41".to_string(),
            glow_intensity: 0.5,
            particles_enabled: true,
            animations_enabled: true,
        }
    }
}

/// Top-level container owned by one principal; holds one desktop forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Workspace {
    pub id: String,

    /// Principal that owns the workspace (remote `user_id`)
    pub owner_id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub theme_config: ThemeConfig,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            is_default: true,
            theme_config: ThemeConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
