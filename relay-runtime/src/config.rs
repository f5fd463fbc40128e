//! Store configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When garbage collection runs after a root is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcPolicy {
    /// Collect synchronously as soon as a released root leaves the buffer
    #[default]
    Immediate,
    /// Collect at the end of the next `notify`
    Deferred,
    /// Collect only on an explicit `collect`
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub gc_policy: GcPolicy,

    /// Released roots kept alive, most recent first, before they become collectable
    pub gc_release_buffer_size: usize,

    /// Operations written longer ago than this are reported stale
    pub query_cache_expiration_ms: Option<u64>,

    pub lookup_cache_capacity: usize,

    /// Payload field holding a record's server identity
    pub id_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            gc_policy: GcPolicy::default(),
            gc_release_buffer_size: 10,
            query_cache_expiration_ms: None,
            lookup_cache_capacity: 64,
            id_field: String::from("id"),
        }
    }
}

impl StoreConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn query_cache_expiration(&self) -> Option<Duration> {
        self.query_cache_expiration_ms.map(Duration::from_millis)
    }
}
