//! Cache configuration options

use query_core::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the caches owned by one executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether query results are cached
    pub result_cache_enabled: bool,
    /// Whether translated plans are cached
    pub plan_cache_enabled: bool,
    /// Whether executions are counted
    pub statistics_enabled: bool,
    /// Initial capacity hint for each cache map
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_cache_enabled: true,
            plan_cache_enabled: true,
            statistics_enabled: true,
            initial_capacity: 256,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with every cache enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with caching and statistics turned off
    pub fn disabled() -> Self {
        Self {
            result_cache_enabled: false,
            plan_cache_enabled: false,
            statistics_enabled: false,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON document. Missing fields take their
    /// default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| QueryError::ConfigError(e.to_string()))
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QueryError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Enable or disable the result cache
    pub fn with_result_cache(mut self, enabled: bool) -> Self {
        self.result_cache_enabled = enabled;
        self
    }

    /// Enable or disable the plan cache
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache_enabled = enabled;
        self
    }

    /// Enable or disable execution statistics
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    /// Set the initial capacity hint
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
