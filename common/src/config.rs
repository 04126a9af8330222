use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Steady-state sampling cadence.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Delay before the next attempt after a failed capture.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Brightness delta (0-255 units) above which a tick counts as a flash.
    #[serde(default = "default_flash_threshold")]
    pub flash_threshold: u8,
    /// Counter value at which a flash episode is declared.
    #[serde(default = "default_max_flash_count")]
    pub max_flash_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtectionConfig {
    /// Quiet time required before the shield is lifted.
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_monitor_index")]
    pub monitor_index: usize,
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_target_height")]
    pub target_height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            flash_threshold: default_flash_threshold(),
            max_flash_count: default_max_flash_count(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            recovery_secs: default_recovery_secs(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            monitor_index: default_monitor_index(),
            target_width: default_target_width(),
            target_height: default_target_height(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_interval_ms() -> u64 {
    20
}
fn default_retry_backoff_ms() -> u64 {
    100
}
fn default_flash_threshold() -> u8 {
    2
}
fn default_max_flash_count() -> u32 {
    2
}
fn default_recovery_secs() -> f64 {
    2.0
}
fn default_monitor_index() -> usize {
    0
}
fn default_target_width() -> u32 {
    64
}
fn default_target_height() -> u32 {
    64
}
fn default_log_level() -> String {
    "info".into()
}
