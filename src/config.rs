//! Configuration Management
//!
//! Optional settings file for describe-engine, stored as JSON under the
//! user config directory. Every field falls back to a built-in default.

use crate::quota::graph::RESOURCE_GRAPH_ENDPOINT;
use crate::quota::DEFAULT_BATCH_SIZE;
use crate::scope::DEFAULT_PARTITION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Jobs run at once when describing several resource types
pub const DEFAULT_POOL_CONCURRENCY: usize = 4;

/// Environment variable overriding the Resource Graph endpoint
pub const GRAPH_ENDPOINT_ENV: &str = "AZURE_RESOURCE_GRAPH_ENDPOINT";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Worker pool size for multi-type describes
    #[serde(default)]
    pub pool_concurrency: Option<usize>,
    /// Subscriptions per Resource Graph query
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Partition whose regions are listed when no scopes are given
    #[serde(default)]
    pub partition: Option<String>,
    /// Resource Graph management endpoint
    #[serde(default)]
    pub graph_endpoint: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("describe-engine").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, defaulting when absent or malformed
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn effective_pool_concurrency(&self) -> usize {
        self.pool_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_POOL_CONCURRENCY)
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Get effective partition (CLI > config > default)
    pub fn effective_partition(&self, cli: Option<&str>) -> String {
        cli.map(|s| s.to_string())
            .or_else(|| self.partition.clone())
            .unwrap_or_else(|| DEFAULT_PARTITION.to_string())
    }

    /// Get effective Resource Graph endpoint (config > environment > default)
    pub fn effective_graph_endpoint(&self) -> String {
        self.graph_endpoint
            .clone()
            .or_else(|| std::env::var(GRAPH_ENDPOINT_ENV).ok())
            .unwrap_or_else(|| RESOURCE_GRAPH_ENDPOINT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_pool_concurrency(), DEFAULT_POOL_CONCURRENCY);
        assert_eq!(config.effective_batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(config.effective_partition(None), "aws");
        assert_eq!(config.effective_partition(Some("aws-cn")), "aws-cn");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("describe-engine-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"pool_concurrency": 8, "partition": "aws-us-gov", "batch_size": 0}"#)
            .unwrap();

        let config = Config::load_from(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.effective_pool_concurrency(), 8);
        assert_eq!(config.effective_partition(None), "aws-us-gov");
        assert_eq!(config.effective_batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let path = std::env::temp_dir().join(format!("describe-engine-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();

        let config = Config::load_from(&path);
        let _ = std::fs::remove_file(&path);

        assert!(config.pool_concurrency.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(Path::new("/nonexistent/describe-engine/config.json"));
        assert!(config.partition.is_none());
    }
}
