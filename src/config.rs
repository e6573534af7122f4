//! Engine configuration
//!
//! Tunables for strategy selection and dependency building. Every key is
//! optional in the serialized form; missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StateError};

/// Pinned-id count at or above which a view uses the high-volume buffer
pub const HIGH_VOLUME_THRESHOLD: usize = 1000;

/// How a high-volume buffer answers `size()`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Ask the record source for a count (it may still report "unknown")
    Query,
    /// Always report -1
    Unknown,
}

/// Options for building dependency maps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Fail schema building when field logic forms a cycle of two or more fields
    pub reject_cycles: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            reject_cycles: true,
        }
    }
}

/// Configuration shared by documents and views of one engine instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub high_volume_threshold: usize,
    /// Capacity of the high-volume buffer's recently-seen row cache
    pub high_volume_row_cache: usize,
    pub high_volume_count: CountPolicy,
    pub default_page_length: usize,
    pub dependencies: DependencyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_volume_threshold: HIGH_VOLUME_THRESHOLD,
            high_volume_row_cache: 500,
            high_volume_count: CountPolicy::Query,
            default_page_length: 20,
            dependencies: DependencyConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| StateError::configuration(format!("invalid engine config: {}", e)))?;
        config.validated()
    }

    pub fn from_json_value(params: serde_json::Value) -> Result<Self> {
        let config: EngineConfig = serde_json::from_value(params)
            .map_err(|e| StateError::configuration(format!("invalid engine config: {}", e)))?;
        config.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            StateError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&data)
    }

    fn validated(self) -> Result<Self> {
        if self.high_volume_threshold == 0 {
            return Err(StateError::configuration(
                "high_volume_threshold must be positive",
            ));
        }
        if self.default_page_length == 0 {
            return Err(StateError::configuration(
                "default_page_length must be positive",
            ));
        }
        Ok(self)
    }
}
