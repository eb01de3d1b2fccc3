//! Configuration for Tagwatch
//!
//! Every field has a default, so a missing or partial `config.toml` is fine.

use crate::error::{Result, WatchError};
use crate::watch::PathFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory names skipped by both the indexer and live watches.
pub const DEFAULT_EXCLUDE_DIR_NAMES: &[&str] = &["node_modules", ".git", "__pycache__"];

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagwatchConfig {
    /// Path to the SQLite catalog
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Write-stability delay before an event is delivered, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Index and watch entries whose name starts with `.`
    #[serde(default)]
    pub include_hidden: bool,

    /// Directory names never descended into
    #[serde(default = "default_exclude_dir_names")]
    pub exclude_dir_names: Vec<String>,

    /// Entries per batch handed from the directory walk to the catalog writer
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,

    /// Reinstall persisted watches on startup
    #[serde(default = "default_auto_start_monitoring")]
    pub auto_start_monitoring: bool,
}

fn default_database_path() -> PathBuf {
    tagwatch_logging::tagwatch_home().join("tagwatch.sqlite3")
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_exclude_dir_names() -> Vec<String> {
    DEFAULT_EXCLUDE_DIR_NAMES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_index_batch_size() -> usize {
    500
}

fn default_auto_start_monitoring() -> bool {
    true
}

impl Default for TagwatchConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            debounce_ms: default_debounce_ms(),
            include_hidden: false,
            exclude_dir_names: default_exclude_dir_names(),
            index_batch_size: default_index_batch_size(),
            auto_start_monitoring: default_auto_start_monitoring(),
        }
    }
}

/// Default location of the config file: `<home>/config.toml`
pub fn default_config_path() -> PathBuf {
    tagwatch_logging::tagwatch_home().join("config.toml")
}

impl TagwatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| WatchError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Entry filter shared by the indexer and the watch registry
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(self.include_hidden, self.exclude_dir_names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TagwatchConfig::default();
        assert!(config.database_path.ends_with("tagwatch.sqlite3"));
        assert_eq!(config.debounce_ms, 1000);
        assert!(!config.include_hidden);
        assert_eq!(config.exclude_dir_names.len(), 3);
        assert_eq!(config.index_batch_size, 500);
        assert!(config.auto_start_monitoring);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: TagwatchConfig = toml::from_str("debounce_ms = 250\n").unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.index_batch_size, 500);
        assert_eq!(config.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = TagwatchConfig {
            database_path: tmp.path().join("catalog.db"),
            debounce_ms: 50,
            include_hidden: true,
            exclude_dir_names: vec!["target".to_string()],
            index_batch_size: 8,
            auto_start_monitoring: false,
        };
        config.save(&path).unwrap();

        let loaded = TagwatchConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = TagwatchConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.debounce_ms, 1000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"").unwrap();

        assert!(matches!(
            TagwatchConfig::load(&path),
            Err(WatchError::Config(_))
        ));
    }
}
