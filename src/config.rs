//! Node configuration
//!
//! A single JSON file. Only `data_dir` is required; every other key has a
//! default and is validated on load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};
use crate::state_machine::{ApplySettings, DuplicateDeliveryPolicy};
use crate::txlog::SEGMENT_HEADER_SIZE;

/// Directory under `data_dir` that holds the log segments
pub const LOG_DIR_NAME: &str = "txlog";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the node (required)
    pub data_dir: PathBuf,

    /// Transactions per durable batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Segment size that triggers rotation (default 250 MiB)
    #[serde(default = "default_log_rotation_threshold")]
    pub log_rotation_threshold_bytes: u64,

    #[serde(default)]
    pub duplicate_delivery: DuplicateDeliveryPolicy,

    #[serde(default = "default_recent_commit_window")]
    pub recent_commit_window: usize,
}

fn default_max_batch_size() -> usize {
    64
}
fn default_log_rotation_threshold() -> u64 {
    262_144_000
}
fn default_recent_commit_window() -> usize {
    1024
}

impl Config {
    /// Configuration with defaults for everything but the data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_batch_size: default_max_batch_size(),
            log_rotation_threshold_bytes: default_log_rotation_threshold(),
            duplicate_delivery: DuplicateDeliveryPolicy::default(),
            recent_commit_window: default_recent_commit_window(),
        }
    }

    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content)?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("data_dir", &config.data_dir.display().to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be > 0".into()));
        }
        if self.recent_commit_window == 0 {
            return Err(ConfigError::Invalid(
                "recent_commit_window must be > 0".into(),
            ));
        }
        if self.log_rotation_threshold_bytes <= SEGMENT_HEADER_SIZE as u64 {
            return Err(ConfigError::Invalid(format!(
                "log_rotation_threshold_bytes must exceed the {} byte segment header",
                SEGMENT_HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Where the transaction log lives
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn apply_settings(&self) -> ApplySettings {
        ApplySettings {
            max_batch_size: self.max_batch_size,
            duplicate_delivery: self.duplicate_delivery,
            recent_commit_window: self.recent_commit_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_optional_keys() {
        let config = Config::from_json(r#"{"data_dir": "/var/lib/txreplica"}"#).unwrap();
        assert_eq!(config, Config::new("/var/lib/txreplica"));
        assert_eq!(config.log_dir(), PathBuf::from("/var/lib/txreplica/txlog"));
        assert_eq!(config.apply_settings(), ApplySettings::default());
    }

    #[test]
    fn test_duplicate_policy_is_snake_case() {
        let config = Config::from_json(
            r#"{"data_dir": "d", "duplicate_delivery": "acknowledge_applied"}"#,
        )
        .unwrap();
        assert_eq!(
            config.duplicate_delivery,
            DuplicateDeliveryPolicy::AcknowledgeApplied
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        for json in [
            r#"{"data_dir": "d", "max_batch_size": 0}"#,
            r#"{"data_dir": "d", "recent_commit_window": 0}"#,
            r#"{"data_dir": "d", "log_rotation_threshold_bytes": 25}"#,
            r#"{"data_dir": ""}"#,
        ] {
            assert!(
                matches!(Config::from_json(json), Err(ConfigError::Invalid(_))),
                "{}",
                json
            );
        }
    }

    #[test]
    fn test_missing_data_dir_is_parse_error() {
        assert!(matches!(
            Config::from_json(r#"{"max_batch_size": 4}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("txreplica.json");
        fs::write(&path, r#"{"data_dir": "/data", "max_batch_size": 8}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_batch_size, 8);

        let missing = Config::load(&temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
