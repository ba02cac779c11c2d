//! Provider manager configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::ProviderError;

/// Tunables for a [`crate::ProviderManager`].
///
/// Can be loaded from a TOML file via [`ProviderConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Maximum number of content ids whose provider sets are kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// How long a provider claim stays valid after it was last seen.
    #[serde(default = "default_provide_validity_ms")]
    pub provide_validity_ms: u64,

    /// Interval between expiry sweeps over the durable store.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Requests that may wait for the control loop before callers block.
    #[serde(default = "default_request_queue_depth")]
    pub request_queue_depth: usize,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_cache_capacity() -> usize {
    256
}

fn default_provide_validity_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_cleanup_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_request_queue_depth() -> usize {
    128
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ProviderConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ProviderError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ProviderError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ProviderError> {
        let config: Self = toml::from_str(s).map_err(|e| ProviderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ProviderError> {
        toml::to_string_pretty(self).map_err(|e| ProviderError::Config(e.to_string()))
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.cache_capacity == 0 {
            return Err(ProviderError::Config("cache_capacity must be at least 1".into()));
        }
        if self.provide_validity_ms == 0 {
            return Err(ProviderError::Config(
                "provide_validity_ms must be greater than zero".into(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ProviderError::Config(
                "cleanup_interval_ms must be greater than zero".into(),
            ));
        }
        if self.request_queue_depth == 0 {
            return Err(ProviderError::Config(
                "request_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_capacity(&self) -> Result<NonZeroUsize, ProviderError> {
        NonZeroUsize::new(self.cache_capacity)
            .ok_or_else(|| ProviderError::Config("cache_capacity must be at least 1".into()))
    }

    pub fn provide_validity(&self) -> Duration {
        Duration::from_millis(self.provide_validity_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_provide_validity(mut self, validity: Duration) -> Self {
        self.provide_validity_ms = duration_to_ms(validity);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = duration_to_ms(interval);
        self
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            provide_validity_ms: default_provide_validity_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            request_queue_depth: default_request_queue_depth(),
        }
    }
}
