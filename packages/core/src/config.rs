//! Engine configuration

use crate::models::validation::MAX_ASSET_BYTES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "DESKFLOW_DB_PATH";
pub const ENV_ASSET_BUCKET: &str = "DESKFLOW_ASSET_BUCKET";
pub const ENV_STATUS_RESET_MS: &str = "DESKFLOW_STATUS_RESET_MS";
pub const ENV_VERIFY_CHECKSUM: &str = "DESKFLOW_VERIFY_CHECKSUM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local database file; `None` resolves to ~/.deskflow/database/deskflow.db
    pub database_path: Option<PathBuf>,

    /// Remote blob bucket holding asset payloads
    pub asset_bucket: String,

    /// How long a successful sync status stays visible before reverting to idle
    pub status_reset_delay_ms: u64,

    /// Versions returned by `list_versions` when no limit is given
    pub default_version_limit: usize,

    /// Largest accepted asset payload in bytes
    pub max_asset_bytes: usize,

    /// Reject portable documents whose checksum does not match their content;
    /// when off a mismatch is only logged and reported on the import result
    pub verify_import_checksum: bool,

    /// Written into exported documents as `metadata.sourceVersion`
    pub source_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            asset_bucket: "assets".to_string(),
            status_reset_delay_ms: 3000,
            default_version_limit: 50,
            max_asset_bytes: MAX_ASSET_BYTES,
            verify_import_checksum: false,
            source_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DESKFLOW_*` environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(bucket) = lookup(ENV_ASSET_BUCKET) {
            config.asset_bucket = bucket;
        }
        if let Some(ms) = lookup(ENV_STATUS_RESET_MS) {
            config.status_reset_delay_ms = ms
                .trim()
                .parse()
                .map_err(|_| format!("{} must be a number of milliseconds, got '{}'", ENV_STATUS_RESET_MS, ms))?;
        }
        if let Some(flag) = lookup(ENV_VERIFY_CHECKSUM) {
            config.verify_import_checksum = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(format!("{} must be a boolean, got '{}'", ENV_VERIFY_CHECKSUM, flag)),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the database path, resolving it under ~/.deskflow/database/
    pub fn resolve_database_path(&self) -> Result<PathBuf, std::io::Error> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let home_dir = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Cannot determine home directory",
            )
        })?;

        Ok(home_dir
            .join(".deskflow")
            .join("database")
            .join("deskflow.db"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.asset_bucket.trim().is_empty() {
            return Err("asset_bucket cannot be empty".to_string());
        }

        if self.default_version_limit == 0 {
            return Err("default_version_limit must be greater than 0".to_string());
        }

        if self.max_asset_bytes == 0 || self.max_asset_bytes > MAX_ASSET_BYTES {
            return Err(format!(
                "max_asset_bytes must be between 1 and {} (remote storage limit)",
                MAX_ASSET_BYTES
            ));
        }

        if self.source_version.is_empty() {
            return Err("source_version cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.asset_bucket, "assets");
        assert_eq!(config.status_reset_delay_ms, 3000);
        assert!(!config.verify_import_checksum);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/tmp/deskflow-test.db"),
            (ENV_STATUS_RESET_MS, "10"),
            (ENV_VERIFY_CHECKSUM, "on"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(
            config.resolve_database_path().unwrap(),
            PathBuf::from("/tmp/deskflow-test.db")
        );
        assert_eq!(config.status_reset_delay_ms, 10);
        assert!(config.verify_import_checksum);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(EngineConfig::from_lookup(|k| (k == ENV_STATUS_RESET_MS).then(|| "soon".to_string())).is_err());
        assert!(EngineConfig::from_lookup(|k| (k == ENV_ASSET_BUCKET).then(|| " ".to_string())).is_err());

        let mut config = EngineConfig::default();
        config.max_asset_bytes = MAX_ASSET_BYTES + 1;
        assert!(config.validate().is_err());
    }
}
