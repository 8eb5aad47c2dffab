//! Persistent user settings for nibclip
//!
//! The TOML file lives in the platform configuration directory:
//! - Linux: `~/.config/nibclip/nibclip_config.toml`
//! - macOS: `~/Library/Application Support/nibclip/nibclip_config.toml`
//! - Windows: `%APPDATA%\nibclip\nibclip_config.toml`
//!
//! # Example
//!
//! ```toml
//! [size_policy]
//! enforce_power_of_two = true
//! min_size = 32
//! max_size = 1024
//!
//! [backup]
//! enabled = true
//! suffix = ".bak"
//!
//! [swap]
//! remove_before_swap = true
//! sync = true
//! ```

use crate::config::{Config, SizePolicy, DEFAULT_BACKUP_SUFFIX};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// File name inside the nibclip config directory
const CONFIG_FILE_NAME: &str = "nibclip_config.toml";

/// Directory under the platform config root
const APP_NAME: &str = "nibclip";

/// Persistent defaults for nibclip runs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Bounds on the processed window
    pub size_policy: SizePolicy,

    /// Backup settings
    pub backup: BackupSettings,

    /// Swap settings
    pub swap: SwapSettings,
}

/// Settings for backups of in-place transforms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupSettings {
    /// Whether to keep a backup by default
    pub enabled: bool,

    /// Suffix appended to the file name
    pub suffix: String,
}

/// Settings for the final swap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SwapSettings {
    /// Delete an existing output before renaming the temp file over it
    pub remove_before_swap: bool,

    /// Sync the temp file to disk before the swap
    pub sync: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            remove_before_swap: true,
            sync: true,
        }
    }
}

impl Settings {
    /// Settings from the default location, or defaults when unavailable
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Settings from `path`, or defaults when it is absent or unusable
    ///
    /// A missing file is normal and logged at debug level; a file that
    /// exists but cannot be read or parsed is logged as a warning.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No configuration directory, running with built-in settings");
            return Self::default();
        };

        match Self::read_from(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Using settings from {:?}", path);
                settings
            }
            Ok(None) => {
                tracing::debug!("No settings file at {:?}, running with built-in settings", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring settings file: {}", e);
                Self::default()
            }
        }
    }

    /// Parse the file at `path`; `Ok(None)` when it does not exist
    pub fn read_from(path: &Path) -> Result<Option<Self>, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&contents)
            .map(Some)
            .map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write these settings to `path`, creating its directory
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        std::fs::write(&path, self.to_toml_string()?).map_err(io_error(&path))?;

        tracing::info!("Wrote settings to {:?}", path);
        Ok(path)
    }

    /// `<config_dir>/nibclip/nibclip_config.toml`, if the platform has a config dir
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs_next::config_dir()?;
        path.push(APP_NAME);
        path.push(CONFIG_FILE_NAME);
        Some(path)
    }

    /// Render these settings as TOML
    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(SettingsError::Serialize)
    }

    /// Runtime configuration derived from these settings
    pub fn to_config(&self) -> Config {
        Config::new()
            .size_policy(self.size_policy)
            .backup_suffix(self.backup.suffix.clone())
            .remove_before_swap(self.swap.remove_before_swap)
            .sync_temp(self.swap.sync)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SettingsError {
    let path = path.to_path_buf();
    move |source| SettingsError::Io { path, source }
}

/// Settings file failures
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The platform reports no configuration directory
    #[error("No configuration directory on this platform")]
    NoConfigDir,

    /// Reading or writing the settings file failed
    #[error("Cannot access {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// The underlying error
        source: io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`]
    #[error("Cannot parse {path}: {source}")]
    Parse {
        /// Settings file
        path: PathBuf,
        /// The underlying error
        source: toml::de::Error,
    },

    /// Rendering settings as TOML failed
    #[error("Cannot render settings: {0}")]
    Serialize(toml::ser::Error),
}
