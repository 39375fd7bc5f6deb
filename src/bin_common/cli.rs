//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use anyhow::{bail, Context, Result};
use ecr_session::core::config::{
    DEFAULT_ACK_RETRY_INTERVAL, DEFAULT_ENDPOINT, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_RECONNECT_DELAY,
};
use ecr_session::{FixedDelay, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Session configuration (config/ecr.yaml)
    Session,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Session => "config/ecr.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        "ECR_CONFIG_PATH"
    }
}

/// Load configuration path from environment or use default
///
/// A custom path always wins over the environment.
///
/// # Examples
/// ```
/// use sobit_ecr::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("ecr.yaml".to_string()));
/// assert_eq!(path.to_str(), Some("ecr.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = config_type {
        return path.into();
    }

    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Read a required environment variable
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("environment variable {} is missing", name),
    }
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Session settings read from YAML
///
/// Every field is optional; an absent file yields the library defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// WebSocket URL of the transaction service
    pub endpoint: String,
    /// Keepalive probe period
    pub keepalive_ms: u64,
    /// Retransmission period for unacknowledged notifications
    pub ack_retry_ms: u64,
    /// Reconnect after an unexpected drop
    pub reconnect: bool,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay_ms: u64,
    /// Give up after this many attempts (unbounded when absent)
    pub reconnect_max_attempts: Option<usize>,
    /// Random extra delay added to each attempt
    pub reconnect_jitter_ms: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            keepalive_ms: DEFAULT_KEEPALIVE_INTERVAL.as_millis() as u64,
            ack_retry_ms: DEFAULT_ACK_RETRY_INTERVAL.as_millis() as u64,
            reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            reconnect_max_attempts: None,
            reconnect_jitter_ms: 0,
            log_level: "info".to_string(),
        }
    }
}

impl FileConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let yaml_content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&yaml_content)
    }

    /// Load the file when it exists, defaults otherwise
    pub fn load_or_default(config_path: impl AsRef<Path>) -> Result<Self> {
        if config_path.as_ref().exists() {
            Self::load(config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FileConfig = serde_yaml::from_str(yaml).context("invalid session config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            bail!("endpoint cannot be empty");
        }
        if self.keepalive_ms == 0 {
            bail!("keepalive_ms must be greater than 0");
        }
        if self.ack_retry_ms == 0 {
            bail!("ack_retry_ms must be greater than 0");
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("log_level must be one of: {}", valid_levels.join(", "));
        }
        Ok(())
    }

    /// Session configuration for the builder
    pub fn session_config(&self) -> SessionConfig {
        let mut strategy = FixedDelay::new(
            Duration::from_millis(self.reconnect_delay_ms),
            self.reconnect_max_attempts,
        );
        if self.reconnect_jitter_ms > 0 {
            strategy = strategy.with_jitter(Duration::from_millis(self.reconnect_jitter_ms));
        }

        SessionConfig::default()
            .with_endpoint(self.endpoint.clone())
            .with_keepalive_interval(Duration::from_millis(self.keepalive_ms))
            .with_ack_retry_interval(Duration::from_millis(self.ack_retry_ms))
            .with_reconnect(self.reconnect)
            .with_reconnect_strategy(strategy)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Endpoint: {}", self.endpoint);
        info!("  Keepalive: {} ms", self.keepalive_ms);
        info!("  Ack retry: {} ms", self.ack_retry_ms);
        info!(
            "  Reconnect: {}",
            if self.reconnect {
                format!("every {} ms", self.reconnect_delay_ms)
            } else {
                "disabled".to_string()
            }
        );
        info!("  Log level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_type_paths() {
        assert_eq!(ConfigType::Session.default_path(), "config/ecr.yaml");

        let custom = ConfigType::Custom("custom/path.yaml".to_string());
        assert_eq!(custom.default_path(), "custom/path.yaml");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = FileConfig::from_yaml("endpoint: ws://localhost:9000\nreconnect: false\n").unwrap();

        assert_eq!(config.endpoint, "ws://localhost:9000");
        assert!(!config.reconnect);
        assert_eq!(config.keepalive_ms, 1000);
        assert_eq!(config.reconnect_delay_ms, 10_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_session_config_mapping() {
        let config = FileConfig::from_yaml("keepalive_ms: 2500\nack_retry_ms: 300\n").unwrap();
        let session = config.session_config();

        assert_eq!(session.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(session.keepalive_interval(), Duration::from_millis(2500));
        assert_eq!(session.ack_retry_interval(), Duration::from_millis(300));
        assert!(session.reconnect_enabled());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(FileConfig::from_yaml("keepalive_ms: 0\n").is_err());
        assert!(FileConfig::from_yaml("endpoint: ''\n").is_err());
        assert!(FileConfig::from_yaml("log_level: loud\n").is_err());
    }
}
