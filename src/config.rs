//! Configuration
//!
//! Settings are kept in a JSON file next to the database. A missing file
//! yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{DomainError, DomainResult};

/// Default clock-skew tolerance for sync comparisons (2 minutes)
pub const DEFAULT_SKEW_TOLERANCE_MS: i64 = 120_000;

pub const CONFIG_FILE_NAME: &str = "collections_config.json";

/// Remote collection service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Remote timestamps must be newer than local ones by more than this
    /// before remote data overwrites local data
    #[serde(default = "default_skew_tolerance_ms")]
    pub skew_tolerance_ms: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("query_collections.db")
}

fn default_skew_tolerance_ms() -> i64 {
    DEFAULT_SKEW_TOLERANCE_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            skew_tolerance_ms: default_skew_tolerance_ms(),
            log_level: default_log_level(),
            remote: None,
        }
    }
}

impl CollectionsConfig {
    /// Load settings from `path`, falling back to defaults if the file is absent
    pub fn load(path: &Path) -> DomainResult<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DomainError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> DomainResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.skew_tolerance_ms < 0 {
            return Err(DomainError::Config(
                "skew_tolerance_ms must not be negative".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(DomainError::Config("remote.base_url is empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn skew_tolerance(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.skew_tolerance_ms)
    }
}
