//! Configuration loading for the HMI.
//!
//! Every field has a default so a missing or partial `config.toml` still
//! yields a usable configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Largest accepted chart window.
pub const MAX_WINDOW_CAPACITY: usize = 100_000;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Device addressing defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceConfig {
    /// Address used until the user saves one in the HMI.
    pub default_address: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_address: "192.168.100.7".to_string(),
        }
    }
}

/// Timing of the command dispatch queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DispatchConfig {
    /// Time a command may stay in flight before it resolves as a timeout.
    pub timeout_ms: u64,
    /// Pause between a resolution and the next scheduled drain.
    pub cooldown_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1500,
            cooldown_ms: 60,
        }
    }
}

/// Realtime-database subscription and chart window settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TelemetryConfig {
    /// Whether the subscription starts enabled (the HMI toggle overrides it).
    pub enabled: bool,
    /// Base URL of the realtime database, without a trailing slash.
    pub database_url: String,
    /// Node whose state object is mirrored (`/nodes/<node-id>`).
    pub node_id: String,
    /// Maximum number of points kept in the chart.
    pub window_capacity: usize,
    /// Trailing-edge throttle between chart publishes.
    pub publish_interval_ms: u64,
    /// Delay before reconnecting a dropped subscription.
    pub reconnect_delay_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: "https://example-default-rtdb.firebaseio.com".to_string(),
            node_id: "NODE_01".to_string(),
            window_capacity: 300,
            publish_interval_ms: 250,
            reconnect_delay_ms: 2000,
        }
    }
}

impl TelemetryConfig {
    /// Streaming endpoint of the node state object.
    pub fn node_url(&self) -> String {
        format!("{}/nodes/{}.json", self.database_url.trim_end_matches('/'), self.node_id)
    }
}

/// Complete HMI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HmiConfig {
    pub device: DeviceConfig,
    pub dispatch: DispatchConfig,
    pub telemetry: TelemetryConfig,
}

impl HmiConfig {
    /// Load configuration from a TOML file.
    ///
    /// A file that does not exist yields the defaults; a file that exists
    /// but cannot be read, parsed or validated is an error.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            log::warn!("Config file {} not found, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: HmiConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("dispatch.timeout-ms must be greater than zero".into()));
        }
        if self.telemetry.window_capacity == 0 || self.telemetry.window_capacity > MAX_WINDOW_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "telemetry.window-capacity must be between 1 and {}",
                MAX_WINDOW_CAPACITY
            )));
        }
        if self.telemetry.publish_interval_ms == 0 {
            return Err(ConfigError::ValidationError("telemetry.publish-interval-ms must be greater than zero".into()));
        }
        if self.telemetry.node_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("telemetry.node-id must not be empty".into()));
        }
        Ok(())
    }

    /// Config path from the first argument after the program name, or the default file name.
    pub fn path_from_args(mut args: impl Iterator<Item = String>) -> PathBuf {
        args.nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
