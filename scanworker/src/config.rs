/*!
Configuration management for the scan worker.
*/

use anyhow::{Context, Result};
use code_decoder::EngineConfig;
use serde::{Deserialize, Serialize};
use shared::defaults;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        config
            .engine
            .validate()
            .with_context(|| "Invalid [engine] section")?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Request router configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Readiness handshake timeout in milliseconds
    pub init_timeout_ms: u64,

    /// Per-decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Timeout for stats, cache, capability, configure and ping requests
    pub request_timeout_ms: u64,

    /// Command channel capacity between handles and the router task
    pub command_buffer: usize,

    /// Scan event broadcast capacity
    pub event_buffer: usize,

    /// Messages the background worker may have queued before posts fail
    pub worker_inbox: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: defaults::INIT_TIMEOUT_MS,
            decode_timeout_ms: defaults::DECODE_TIMEOUT_MS,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            command_buffer: 256,
            event_buffer: 64,
            worker_inbox: 64,
        }
    }
}

impl RouterConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::new();
        assert_eq!(config.engine.cooldown_ms, 1500);
        assert_eq!(config.router.init_timeout(), Duration::from_secs(10));
        assert_eq!(config.router.decode_timeout(), Duration::from_millis(1000));
        assert_eq!(config.router.command_buffer, 256);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::new();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[engine]\ncooldown_ms = 400\nenabled_formats = [\"QR_CODE\"]\n\n[router]\ndecode_timeout_ms = 250\n",
        )
        .unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.engine.cooldown_ms, 400);
        assert_eq!(config.engine.enabled_formats.len(), 1);
        assert!(config.engine.try_harder);
        assert_eq!(config.router.decode_timeout_ms, 250);
        assert_eq!(config.router.init_timeout_ms, 10_000);
    }

    #[test]
    fn test_invalid_engine_section_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[engine]\ncenter_fraction = 1.5\n").unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).is_err());

        assert!(AppConfig::load_from_file("/nonexistent/scanworker.toml").is_err());
        assert!(AppConfig::load_or_default("/nonexistent/scanworker.toml").is_ok());
    }
}
