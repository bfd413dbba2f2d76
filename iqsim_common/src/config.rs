//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for the simulator binaries. Every field carries a default, so the config
//! file itself is optional.
//!
//! # Usage
//!
//! ```rust,no_run
//! use iqsim_common::config::{ConfigLoader, SimConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = SimConfig::load(Path::new("iqsim.toml"))?;
//!     config.validate()?;
//!     println!("Poll interval: {}ms", config.bridge.poll_interval_ms);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::consts::{
    DEFAULT_FRAME_RATE_HZ, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STARTUP_DELAY_MS,
    DEFAULT_TELEMETRY_EVERY,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across the simulator binaries.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "iqsim-bridge"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "iqsim".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// IPC bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long one read-loop iteration waits for a line before re-checking
    /// the shutdown flag.
    pub poll_interval_ms: u64,
    /// Pause after the script thread starts before the read loop begins.
    pub startup_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
        }
    }
}

impl BridgeConfig {
    /// Poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Startup delay as Duration.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// In-process host loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Target frames per second.
    pub frame_rate_hz: u32,
    /// Frames between telemetry log lines.
    pub telemetry_every: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            telemetry_every: DEFAULT_TELEMETRY_EVERY,
        }
    }
}

impl HostConfig {
    /// Frame period derived from the frame rate.
    pub fn frame_time(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Top-level simulator configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
///
/// [bridge]
/// poll_interval_ms = 10
/// startup_delay_ms = 200
///
/// [host]
/// frame_rate_hz = 60
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Shared settings.
    pub shared: SharedConfig,
    /// IPC bridge settings.
    pub bridge: BridgeConfig,
    /// In-process host settings.
    pub host: HostConfig,
}

impl SimConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.bridge.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.host.frame_rate_hz == 0 {
            return Err(ConfigError::ValidationError(
                "host.frame_rate_hz must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    ///
    /// A path that was given explicitly but does not exist is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
