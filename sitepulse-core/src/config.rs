//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sitepulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sitepulse/` (~/.config/sitepulse/)
//! - Data: `$XDG_DATA_HOME/sitepulse/` (~/.local/share/sitepulse/)
//! - State/Logs: `$XDG_STATE_HOME/sitepulse/` (~/.local/state/sitepulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Analytics backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Capture and dispatch tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted analytics backend configuration
///
/// When disabled (or incompletely configured), the pipeline still runs:
/// every payload is parked in the offline queue until a backend appears.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Enable/disable backend delivery
    #[serde(default)]
    pub enabled: bool,

    /// Record-store base URL (e.g., `https://analytics.example.com`)
    pub server_url: Option<String>,

    /// API key (format: "sp_live_xxxx")
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            api_key: None,
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl BackendConfig {
    /// Check if the backend is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some() && self.api_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.server_url.is_none() {
            return Err(Error::Config(
                "backend.server_url is required when backend is enabled".to_string(),
            ));
        }
        if self.api_key.is_none() {
            return Err(Error::Config(
                "backend.api_key is required when backend is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_backend_timeout() -> u64 {
    30
}

/// Capture and dispatch tunables, with defaults matching production behavior
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Seconds between periodic flushes
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Offline queue capacity, in entries
    #[serde(default = "default_offline_capacity")]
    pub offline_capacity: usize,

    /// Trailing window for rage-click detection, in milliseconds
    #[serde(default = "default_rage_window")]
    pub rage_click_window_ms: u64,

    /// Clicks required inside the window before a rage click can trigger
    #[serde(default = "default_rage_threshold")]
    pub rage_click_threshold: usize,

    /// Bounding-box area (device-pixel units) below which a burst counts as a rage click
    #[serde(default = "default_rage_max_area")]
    pub rage_click_max_area: f64,

    /// Pointer observation throttle tick, in milliseconds
    #[serde(default = "default_heatmap_tick")]
    pub heatmap_tick_ms: u64,

    /// Fraction of observed pointer ticks retained for the heatmap
    #[serde(default = "default_heatmap_probability")]
    pub heatmap_sample_probability: f64,

    /// Rolling heatmap buffer capacity, in points
    #[serde(default = "default_heatmap_capacity")]
    pub heatmap_capacity: usize,

    /// Most-recent points attached to each outgoing batch
    #[serde(default = "default_heatmap_batch_sample")]
    pub heatmap_batch_sample: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
            offline_capacity: default_offline_capacity(),
            rage_click_window_ms: default_rage_window(),
            rage_click_threshold: default_rage_threshold(),
            rage_click_max_area: default_rage_max_area(),
            heatmap_tick_ms: default_heatmap_tick(),
            heatmap_sample_probability: default_heatmap_probability(),
            heatmap_capacity: default_heatmap_capacity(),
            heatmap_batch_sample: default_heatmap_batch_sample(),
        }
    }
}

impl PipelineConfig {
    /// Validate tunables, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "pipeline.flush_interval_secs must be positive".to_string(),
            ));
        }
        if self.offline_capacity == 0 {
            return Err(Error::Config(
                "pipeline.offline_capacity must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.heatmap_sample_probability) {
            return Err(Error::Config(
                "pipeline.heatmap_sample_probability must be between 0 and 1".to_string(),
            ));
        }
        if self.heatmap_batch_sample > self.heatmap_capacity {
            return Err(Error::Config(
                "pipeline.heatmap_batch_sample cannot exceed heatmap_capacity".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_flush_interval() -> u64 {
    30
}

fn default_offline_capacity() -> usize {
    100
}

fn default_rage_window() -> u64 {
    2000
}

fn default_rage_threshold() -> usize {
    5
}

fn default_rage_max_area() -> f64 {
    100.0
}

fn default_heatmap_tick() -> u64 {
    100
}

fn default_heatmap_probability() -> f64 {
    0.1
}

fn default_heatmap_capacity() -> usize {
    1000
}

fn default_heatmap_batch_sample() -> usize {
    100
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.backend.validate()?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sitepulse/config.toml` (~/.config/sitepulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sitepulse").join("config.toml")
    }

    /// Returns the data directory path (for the offline queue database)
    ///
    /// `$XDG_DATA_HOME/sitepulse/` (~/.local/share/sitepulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("sitepulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/sitepulse/` (~/.local/state/sitepulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sitepulse")
    }

    /// Returns the offline queue database path
    ///
    /// `$XDG_DATA_HOME/sitepulse/queue.db` (~/.local/share/sitepulse/queue.db)
    pub fn queue_path() -> PathBuf {
        Self::data_dir().join("queue.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/sitepulse/sitepulse.log` (~/.local/state/sitepulse/sitepulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sitepulse.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.backend.enabled);
        assert_eq!(config.pipeline.flush_interval_secs, 30);
        assert_eq!(config.pipeline.offline_capacity, 100);
        assert_eq!(config.pipeline.rage_click_threshold, 5);
        assert_eq!(config.pipeline.heatmap_capacity, 1000);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
enabled = true
server_url = "https://analytics.example.com"
api_key = "sp_live_xxxxxxxxxxxx"

[pipeline]
flush_interval_secs = 10
offline_capacity = 50

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.backend.enabled);
        assert!(config.backend.is_ready());
        assert_eq!(config.pipeline.flush_interval_secs, 10);
        assert_eq!(config.pipeline.offline_capacity, 50);
        // Unspecified tunables keep their defaults
        assert_eq!(config.pipeline.rage_click_window_ms, 2000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_backend_config_validation() {
        // Disabled config is always valid
        let config = BackendConfig::default();
        assert!(config.validate().is_ok());

        // Enabled without credentials should fail
        let config = BackendConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Enabled with all credentials should pass
        let config = BackendConfig {
            enabled: true,
            server_url: Some("https://analytics.example.com".to_string()),
            api_key: Some("sp_live_test".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
    }

    #[test]
    fn test_pipeline_config_validation() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        let config = PipelineConfig {
            heatmap_sample_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            offline_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
