//! Configuration for the relay server
//!
//! Loaded from a YAML file with serde defaults, so an empty or missing file
//! still yields a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Virtual device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// When false the relay starts in dry mode (no forwarding)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Driver device id (reserved for real drivers; the console sink
    /// only reports it)
    #[serde(default = "default_device_id")]
    pub id: u32,
}

/// Telemetry tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Ring capacity for cadence/latency history
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: default_device_id(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_device_id() -> u32 {
    1
}

fn default_window() -> usize {
    crate::telemetry::DEFAULT_WINDOW
}

impl AppConfig {
    /// Load configuration from a YAML file. A missing file is not an
    /// error: defaults apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&yaml)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}
