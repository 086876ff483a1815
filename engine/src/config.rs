//! Batch configuration.
//!
//! A `BatchConfig` can be loaded from YAML and then overridden field by field
//! by a host application (the CLI applies its flags on top).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};
use crate::model::OverwritePolicy;

pub const DEFAULT_PARALLELISM: usize = 4;
pub const DEFAULT_WORKER_PREFIX: &str = "worker";
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 200;

/// Settings for one batch of parallel directory transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of flows to run concurrently
    pub parallelism: usize,

    /// Source directory every worker reads from
    pub source: PathBuf,

    /// Directory under which each worker gets its own target
    pub destination: PathBuf,

    /// Worker `i` writes to `destination/<worker_prefix>-<i>`
    pub worker_prefix: String,

    pub overwrite: OverwritePolicy,

    /// Minimum delay between two live progress lines
    pub progress_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            parallelism: DEFAULT_PARALLELISM,
            source: PathBuf::new(),
            destination: PathBuf::new(),
            worker_prefix: DEFAULT_WORKER_PREFIX.to_string(),
            overwrite: OverwritePolicy::default(),
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl BatchConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: BatchConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Check the configuration before anything is started.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(BatchError::Config("parallelism must be at least 1".into()));
        }
        if self.source.as_os_str().is_empty() {
            return Err(BatchError::Config("source is required".into()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(BatchError::Config("destination is required".into()));
        }
        if self.worker_prefix.is_empty() {
            return Err(BatchError::Config("worker_prefix must not be empty".into()));
        }
        if self.worker_prefix.contains(&['/', '\\'][..]) {
            return Err(BatchError::Config(format!(
                "worker_prefix must not contain a path separator, got '{}'",
                self.worker_prefix
            )));
        }
        Ok(())
    }

    /// Destination of worker `worker` (1-based); distinct for every index.
    pub fn worker_destination(&self, worker: usize) -> PathBuf {
        self.destination
            .join(format!("{}-{}", self.worker_prefix, worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BatchConfig {
        BatchConfig {
            source: PathBuf::from("/data/in"),
            destination: PathBuf::from("/data/out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.worker_prefix, "worker");
        assert_eq!(config.overwrite, OverwritePolicy::Skip);
        assert_eq!(config.progress_interval_ms, 200);
    }

    #[test]
    fn test_from_yaml_fills_missing_fields() {
        let config = BatchConfig::from_yaml(
            "source: /data/in\ndestination: /data/out\nparallelism: 8\noverwrite: smart\n",
        )
        .expect("valid yaml");

        assert_eq!(config.parallelism, 8);
        assert_eq!(config.source, PathBuf::from("/data/in"));
        assert_eq!(config.overwrite, OverwritePolicy::Smart);
        assert_eq!(config.worker_prefix, "worker");
        config.validate().expect("config should be valid");
    }

    #[test]
    fn test_from_yaml_rejects_unknown_policy() {
        let result = BatchConfig::from_yaml("overwrite: ask\n");
        assert!(matches!(result, Err(BatchError::Yaml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("batch.yaml");
        std::fs::write(&path, "source: in\ndestination: out\nworker_prefix: run\n")
            .expect("Failed to write config");

        let config = BatchConfig::load(&path).expect("config should load");
        assert_eq!(config.worker_prefix, "run");
        assert_eq!(config.worker_destination(2), PathBuf::from("out").join("run-2"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BatchConfig::load(Path::new("/nonexistent/batch.yaml"));
        assert!(matches!(result, Err(BatchError::Io(_))));
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let config = BatchConfig {
            parallelism: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_paths() {
        let config = BatchConfig {
            source: PathBuf::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = BatchConfig {
            destination: PathBuf::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        for prefix in ["", "a/b", "a\\b"] {
            let config = BatchConfig {
                worker_prefix: prefix.to_string(),
                ..valid_config()
            };
            assert!(config.validate().is_err(), "prefix {:?} should be rejected", prefix);
        }
    }

    #[test]
    fn test_worker_destinations_are_distinct() {
        let config = valid_config();
        let destinations: std::collections::HashSet<_> =
            (1..=16).map(|i| config.worker_destination(i)).collect();
        assert_eq!(destinations.len(), 16);
    }
}
