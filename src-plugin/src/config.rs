//! Configuration management for the bitmaps plugin.
//!
//! Loaded from the platform-standard config directory:
//! - Linux: `~/.config/generator-bitmaps/config.json`
//! - macOS: `~/Library/Application Support/generator-bitmaps/config.json`
//! - Windows: `%APPDATA%\generator-bitmaps\config.json`

use bitmaps_common::logging::APP_NAME;
use bitmaps_common::validation::validate_menu_id;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Which bitmap a snapshot request produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// Flattened thumbnail of the whole document
    #[default]
    Flattened,
    /// Pixmap of the document's first layer
    FirstLayer,
}

impl SnapshotMode {
    /// Convert from string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "flattened" => Some(Self::Flattened),
            "first_layer" => Some(Self::FirstLayer),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flattened => "flattened",
            Self::FirstLayer => "first_layer",
        }
    }
}

/// Plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// Address of the host's Generator endpoint.
    pub host: String,
    /// Port of the host's Generator endpoint.
    pub port: u16,
    /// Id of the menu item this plugin registers and listens for.
    pub menu_id: String,
    /// Localisable label shown for the menu item.
    pub menu_label: String,
    /// Output PNG path. Relative paths resolve against the executable's directory.
    pub output_path: String,
    /// Which bitmap to save.
    pub snapshot_mode: SnapshotMode,
    /// Take one snapshot as soon as the plugin has initialised.
    pub snapshot_on_start: bool,
    /// Seconds to wait for a host reply before giving up on a request.
    pub request_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 49494,
            menu_id: "bitmaps".to_string(),
            menu_label: "$$$/JavaScripts/Generator/Bitmaps/Menu=Bitmaps".to_string(),
            output_path: "out.png".to_string(),
            snapshot_mode: SnapshotMode::Flattened,
            snapshot_on_start: true,
            request_timeout_secs: 30,
        }
    }
}

impl PluginConfig {
    /// `host:port` of the Generator endpoint.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Absolute output path, resolving relative paths against `base`.
    pub fn output_path_in(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.output_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }

    /// Absolute output path, resolving relative paths next to the executable.
    pub fn resolve_output_path(&self) -> PathBuf {
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        self.output_path_in(&base)
    }

    /// Check values that end up inside host scripts.
    pub fn validate(&self) -> Result<(), String> {
        validate_menu_id(&self.menu_id).map_err(|e| e.to_string())?;
        if self.output_path.trim().is_empty() {
            return Err("output_path must not be empty".to_string());
        }
        Ok(())
    }
}

/// Get the path to the default config file.
pub fn get_config_path() -> Result<PathBuf, String> {
    let proj_dirs =
        ProjectDirs::from("", "", APP_NAME).ok_or("Could not determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from the default location.
/// Returns default config if the file doesn't exist or is invalid.
pub fn load_config() -> PluginConfig {
    match get_config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            warn!("Failed to get config path: {}", e);
            PluginConfig::default()
        }
    }
}

/// Load configuration from `path`.
/// Returns default config if the file doesn't exist or is invalid.
pub fn load_config_from(path: &Path) -> PluginConfig {
    if !path.exists() {
        info!("No config file at {:?}, using defaults", path);
        return PluginConfig::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            return PluginConfig::default();
        }
    };

    match serde_json::from_str::<PluginConfig>(&contents) {
        Ok(config) => {
            info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            warn!("Failed to parse config file: {}. Using defaults.", e);
            PluginConfig::default()
        }
    }
}
