//! Client Configuration
//!
//! Startup configuration for the session layer. Loaded from TOML or
//! JSON; every field has a default so an empty file is valid.
//!
//! # Example
//!
//! ```toml
//! telemetry_interval_ms = 2000
//! log_level = "debug"
//!
//! [settings]
//! kill_switch = true
//! protocol = "stealth"
//! dns_servers = ["1.1.1.1"]
//! ```

use crate::model::VpnSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Period of the telemetry driver while connected
    pub telemetry_interval_ms: u64,
    /// Capacity of the external trigger channel
    pub trigger_queue_capacity: usize,
    /// Version reported when the backend cannot tell
    pub app_version_fallback: String,
    /// Default log filter directive
    pub log_level: String,
    /// Settings the session starts with
    pub settings: VpnSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 1000,
            trigger_queue_capacity: 32,
            app_version_fallback: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            settings: VpnSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a file, picking the format from the extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        match format {
            ConfigFormat::Toml => Self::from_toml(&content),
            ConfigFormat::Json => Self::from_json(&content),
        }
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_interval_ms == 0 {
            return Err(ConfigError::Invalid("telemetry_interval_ms must be positive".into()));
        }
        if self.trigger_queue_capacity == 0 {
            return Err(ConfigError::Invalid("trigger_queue_capacity must be positive".into()));
        }
        if self.app_version_fallback.trim().is_empty() {
            return Err(ConfigError::Invalid("app_version_fallback is empty".into()));
        }
        if self.settings.dns_servers.is_empty() {
            return Err(ConfigError::Invalid("at least one DNS server is required".into()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
