//! Metric configuration.
//!
//! `MetricConfig` carries the parameters that shape the zero value of a metric, most
//! notably the KLL sketch size. It is part of a [`ColumnSchema`](crate::schema::ColumnSchema)
//! and therefore of the schema fingerprint used by the [`ProfileCache`](crate::cache::ProfileCache).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// Smallest accepted KLL `k`.
pub const MIN_KLL_K: u32 = 8;

/// Largest accepted KLL `k`. Also bounds what a decoded sketch may claim.
pub const MAX_KLL_K: u32 = 65_536;

/// Default KLL `k`, giving a relative error bound of roughly 10%.
pub const DEFAULT_KLL_K: u32 = 256;

/// Configuration for metric construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// KLL sketch accuracy parameter (default: 256)
    pub kll_k: u32,
    /// Whether array-like values are counted as tensors (default: true).
    /// When disabled they fall into the object lane.
    pub track_tensors: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            kll_k: DEFAULT_KLL_K,
            track_tensors: true,
        }
    }
}

impl MetricConfig {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> MetricConfigBuilder {
        MetricConfigBuilder {
            config: MetricConfig::default(),
        }
    }

    /// Checks the configuration for values the metrics cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_KLL_K..=MAX_KLL_K).contains(&self.kll_k) {
            return Err(ProfileError::invalid_config(format!(
                "kll_k must be between {MIN_KLL_K} and {MAX_KLL_K}, got {}",
                self.kll_k
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MetricConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProfileError::invalid_config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents)
    }
}

/// Builder for [`MetricConfig`].
#[derive(Debug, Clone)]
pub struct MetricConfigBuilder {
    config: MetricConfig,
}

impl MetricConfigBuilder {
    /// Set the KLL sketch `k`.
    pub fn kll_k(mut self, k: u32) -> Self {
        self.config.kll_k = k;
        self
    }

    /// Enable or disable the tensor lane.
    pub fn track_tensors(mut self, enable: bool) -> Self {
        self.config.track_tensors = enable;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<MetricConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MetricConfig::default();
        assert_eq!(config.kll_k, 256);
        assert!(config.track_tensors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_tiny_k() {
        let err = MetricConfig::builder().kll_k(2).build().unwrap_err();
        assert!(matches!(err, ProfileError::InvalidConfiguration(_)));
        let err = MetricConfig::builder().kll_k(MAX_KLL_K + 1).build().unwrap_err();
        assert!(matches!(err, ProfileError::InvalidConfiguration(_)));

        let config = MetricConfig::builder()
            .kll_k(64)
            .track_tensors(false)
            .build()
            .unwrap();
        assert_eq!(config.kll_k, 64);
        assert!(!config.track_tensors);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = MetricConfig::from_json_str(r#"{"kll_k": 128}"#).unwrap();
        assert_eq!(config.kll_k, 128);
        assert!(config.track_tensors);

        assert!(MetricConfig::from_json_str(r#"{"kll_k": 1}"#).is_err());
        assert!(MetricConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"track_tensors": false}}"#).unwrap();

        let config = MetricConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.kll_k, DEFAULT_KLL_K);
        assert!(!config.track_tensors);

        let missing = MetricConfig::from_json_file("/definitely/not/here.json");
        assert!(matches!(missing, Err(ProfileError::InvalidConfiguration(_))));
    }
}
