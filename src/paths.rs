//! Application path resolution
//!
//! In development (a `config.yaml` in the working directory, typical with
//! `cargo run`) everything lives next to it. Otherwise data goes to the
//! platform data directory, e.g. `~/.local/share/vpad-relay` on Linux.

use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

/// Directory name used under the platform data dir
const APP_NAME: &str = "vpad-relay";

/// Resolved locations for config and layout storage.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the layout store file
    pub layouts: PathBuf,
    /// Whether paths were taken from the working directory
    pub is_dev: bool,
}

impl AppPaths {
    /// Detect the appropriate paths for this run.
    ///
    /// An explicit `--config` path wins and keeps its sibling layout file.
    pub fn detect(config_override: Option<&str>) -> Self {
        if let Some(path) = config_override {
            let config = PathBuf::from(path);
            let layouts = config
                .parent()
                .map(|p| p.join("layouts.json"))
                .unwrap_or_else(|| PathBuf::from("layouts.json"));
            return Self {
                config,
                layouts,
                is_dev: true,
            };
        }

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cwd_config = cwd.join("config.yaml");
        if cwd_config.exists() {
            debug!("using working-directory config: {}", cwd_config.display());
            return Self {
                config: cwd_config,
                layouts: cwd.join("layouts.json"),
                is_dev: true,
            };
        }

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        Self {
            config: data_dir.join("config.yaml"),
            layouts: data_dir.join("layouts.json"),
            is_dev: false,
        }
    }

    /// Create the data directory if needed.
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.config.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("creating data directory: {}", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
