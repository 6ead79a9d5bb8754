//! Configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [nodeflow]
//! concurrency = 5
//! max_units_per_submit = 500
//!
//! [api]
//! base_url = "https://project.example.com"
//! plugin_token = "p-123"
//! user_key = "u-456"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

/// Batch submission settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFlowConfig {
    /// Units in flight per batch
    pub concurrency: usize,
    /// Units accepted by one submission, extras are truncated
    pub max_units_per_submit: usize,
    /// Work items per detail query
    pub detail_batch_size: usize,
}

impl NodeFlowConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With concurrency width
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// With per-submission cap
    #[inline]
    #[must_use]
    pub fn with_max_units_per_submit(mut self, max: usize) -> Self {
        self.max_units_per_submit = max;
        self
    }

    /// With detail query batch size
    #[inline]
    #[must_use]
    pub fn with_detail_batch_size(mut self, size: usize) -> Self {
        self.detail_batch_size = size;
        self
    }

    /// Concurrency as a non-zero width
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when zero
    pub fn width(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.concurrency).ok_or_else(|| ConfigError::Invalid {
            key: "concurrency",
            reason: "must be at least 1".to_string(),
        })
    }

    /// Check every value is in range
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first bad key
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.width()?;
        if self.max_units_per_submit == 0 {
            return Err(ConfigError::Invalid {
                key: "max_units_per_submit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.detail_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "detail_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for NodeFlowConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_units_per_submit: 500,
            detail_batch_size: 50,
        }
    }
}

/// Open-API client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Site root, e.g. `https://project.example.com`
    pub base_url: String,
    /// Plugin access token
    pub plugin_token: String,
    /// Acting user key
    pub user_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Create config for a site
    #[inline]
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// With plugin token
    #[inline]
    #[must_use]
    pub fn with_plugin_token(mut self, token: impl Into<String>) -> Self {
        self.plugin_token = token.into();
        self
    }

    /// With user key
    #[inline]
    #[must_use]
    pub fn with_user_key(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = user_key.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check every value is in range
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first bad key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base_url",
                reason: format!("expected an http(s) url, got {:?}", self.base_url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            plugin_token: String::new(),
            user_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Batch submission settings
    pub nodeflow: NodeFlowConfig,
    /// Open-API settings
    pub api: ApiConfig,
}

impl Settings {
    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` on out-of-range values
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(source)?;
        settings.nodeflow.validate()?;
        settings.api.validate()?;
        Ok(settings)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` when the file cannot be read
    /// - see [`Settings::from_toml`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml(&source)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_submission_limits() {
        let config = NodeFlowConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_units_per_submit, 500);
        assert_eq!(config.detail_batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_width_is_rejected() {
        let err = NodeFlowConfig::new().with_concurrency(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "concurrency", .. }));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [nodeflow]
            concurrency = 8

            [api]
            base_url = "https://project.example.com"
            plugin_token = "p-1"
            "#,
        )
        .unwrap();

        assert_eq!(settings.nodeflow.concurrency, 8);
        assert_eq!(settings.nodeflow.max_units_per_submit, 500);
        assert_eq!(settings.api.plugin_token, "p-1");
        assert_eq!(settings.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let err = Settings::from_toml("[api]\nbase_url = \"ftp://x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "base_url", .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[nodeflow]\nmax_units_per_submit = 20").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.nodeflow.max_units_per_submit, 20);

        assert!(matches!(
            Settings::load("/nonexistent/nodeflow.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
