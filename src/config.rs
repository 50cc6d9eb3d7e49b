// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{Facing, ScanConfig};
use crate::constants::{APP_DIR, CONFIG_FILE, DEFAULT_RENDER_TARGET};
use crate::errors::ConfigError;
use crate::session::ControllerOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistent settings
///
/// Stored as JSON; missing fields fall back to their defaults so older files
/// keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device used by the last session, reused on the next automatic start
    pub last_device_id: Option<String>,
    /// Render target the decode engine is bound to
    pub render_target: String,
    /// Preferred facing direction for automatic device selection
    pub facing: Facing,
    /// Decode engine settings
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_device_id: None,
            render_target: DEFAULT_RENDER_TARGET.to_string(),
            facing: Facing::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/scan-session/config.json`
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            warn!("No config directory available, using default settings");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file yet, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Record the device of a finished session
    ///
    /// Only kept when `scan.remember_last_device` is set. Returns whether the
    /// stored value changed.
    pub fn remember_device(&mut self, device_id: Option<String>) -> bool {
        if !self.scan.remember_last_device || device_id.is_none() || self.last_device_id == device_id {
            return false;
        }
        self.last_device_id = device_id;
        true
    }

    /// Controller options derived from these settings
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            render_target: self.render_target.clone(),
            config: self.scan.clone(),
            facing: self.facing,
            last_device: if self.scan.remember_last_device {
                self.last_device_id.clone()
            } else {
                None
            },
        }
    }
}
