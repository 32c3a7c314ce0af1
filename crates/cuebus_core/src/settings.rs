//! Persistent Host Settings
//!
//! Stores the host's device and stream preferences between sessions.
//! Routing state is not persisted here; see [`crate::PatchSnapshot`].
//!
//! # Storage Locations
//! - Linux: `~/.config/cuebus/settings.json`
//! - Windows: `%APPDATA%\cuebus\settings.json`
//! - macOS: `~/Library/Application Support/com.cuebus.cuebus/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::backend::DeviceConfig;
use crate::config::StreamConfig;

fn default_log_filter() -> String {
    "cuebus=info".to_string()
}

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Preferred output device; `None` means the system default
    pub device_name: Option<String>,
    pub stream: StreamConfig,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Open the output device as soon as the host starts
    pub auto_start: bool,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            device_name: None,
            stream: StreamConfig::default(),
            log_filter: default_log_filter(),
            auto_start: false,
            saved_at: None,
        }
    }
}

impl HostSettings {
    /// Load settings from the platform config dir, or defaults if missing/corrupt
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                info!("Using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::File::open(path) {
                Ok(file) => match serde_json::from_reader::<_, HostSettings>(file) {
                    Ok(settings) => {
                        if let Err(e) = settings.stream.validate() {
                            error!("Ignoring invalid stream settings: {}", e);
                            return Self {
                                stream: StreamConfig::default(),
                                ..settings
                            };
                        }
                        info!("Settings loaded from {:?}", path);
                        return settings;
                    }
                    Err(e) => error!("Failed to parse settings file: {}", e),
                },
                Err(e) => error!("Failed to open settings file: {}", e),
            }
        }

        info!("Using default settings");
        Self::default()
    }

    /// Save settings to the platform config dir
    pub fn save(&mut self) -> Result<(), String> {
        let path = Self::config_path().ok_or("Could not determine config path")?;
        self.save_to(&path)
    }

    /// Save settings to an explicit file
    pub fn save_to(&mut self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        self.saved_at = Some(Utc::now());
        let file = fs::File::create(path).map_err(|e| e.to_string())?;
        serde_json::to_writer_pretty(file, self).map_err(|e| e.to_string())?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Record the device the engine ended up on. Returns true if the
    /// preferred device changed and the settings need saving.
    pub fn remember_device(&mut self, device: &DeviceConfig) -> bool {
        if self.device_name.as_deref() == Some(device.device_name.as_str()) {
            return false;
        }
        self.device_name = Some(device.device_name.clone());
        true
    }

    /// Platform-specific configuration file path
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "cuebus", "cuebus")
            .map(|proj| proj.config_dir().join("settings.json"))
    }
}
