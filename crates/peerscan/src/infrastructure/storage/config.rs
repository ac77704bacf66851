//! TOML-based configuration persistence for PeerScan.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\PeerScan\config.toml`
//! - Linux:    `~/.config/peerscan/config.toml`
//! - macOS:    `~/Library/Application Support/PeerScan/config.toml`
//!
//! # Example file
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [discovery]
//! device_found_capacity = 16
//! discovery_timeout_secs = 20
//! permission_timeout_secs = 0      # 0 disables the timeout
//! cancel_discovery_before_connect = true
//!
//! [permissions]
//! required_groups = ["radio-access"]
//! ```
//!
//! # Serde default values
//!
//! Every field carries a `#[serde(default = "...")]` so that a missing file,
//! a missing section, or a missing key all fall back to the same defaults.
//! An older config file keeps working when newer fields are added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use peerscan_core::PermissionGroup;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::application::discovery_session::{CoordinatorSettings, DEFAULT_DISCOVERY_TIMEOUT};
use crate::application::event_bus::{
    BusCapacity, DEFAULT_DEVICE_FOUND_CAPACITY, DEFAULT_TERMINAL_EVENT_CAPACITY,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Schema version string; bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery session tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Buffered device-found events before the oldest is dropped.
    #[serde(default = "default_device_found_capacity")]
    pub device_found_capacity: usize,
    /// Buffered finished/error events before the oldest is dropped.
    #[serde(default = "default_terminal_event_capacity")]
    pub terminal_event_capacity: usize,
    /// Seconds before a running session is finished automatically.  `0` disables.
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    /// Seconds to wait for the permission dialog.  `0` waits forever.
    #[serde(default)]
    pub permission_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cancel_discovery_before_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionsConfig {
    /// Permission groups that must all be granted before discovery starts.
    #[serde(default = "default_required_groups")]
    pub required_groups: Vec<PermissionGroup>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_device_found_capacity() -> usize {
    DEFAULT_DEVICE_FOUND_CAPACITY
}
fn default_terminal_event_capacity() -> usize {
    DEFAULT_TERMINAL_EVENT_CAPACITY
}
fn default_discovery_timeout_secs() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT.as_secs()
}
fn default_true() -> bool {
    true
}
fn default_required_groups() -> Vec<PermissionGroup> {
    vec![
        PermissionGroup::radio_access(),
        PermissionGroup::background_location(),
    ]
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_found_capacity: default_device_found_capacity(),
            terminal_event_capacity: default_terminal_event_capacity(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            permission_timeout_secs: 0,
            cancel_discovery_before_connect: default_true(),
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            required_groups: default_required_groups(),
        }
    }
}

impl DiscoveryConfig {
    /// Converts the on-disk values into runtime coordinator settings.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            bus_capacity: BusCapacity {
                device_found: self.device_found_capacity,
                terminal: self.terminal_event_capacity,
            },
            discovery_timeout: non_zero_secs(self.discovery_timeout_secs),
            permission_timeout: non_zero_secs(self.permission_timeout_secs),
            cancel_discovery_before_connect: self.cancel_discovery_before_connect,
        }
    }

    /// Checks values a user could have entered by hand.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a channel capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("device_found_capacity", self.device_found_capacity),
            ("terminal_event_capacity", self.terminal_event_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "capacity must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning defaults if
/// the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Like [`load_config`], but a platform without a config directory runs on
/// defaults.  Parse and I/O errors are still returned.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config_or_default() -> Result<AppConfig, ConfigError> {
    default_without_config_dir(load_config())
}

fn default_without_config_dir(
    loaded: Result<AppConfig, ConfigError>,
) -> Result<AppConfig, ConfigError> {
    match loaded {
        Err(ConfigError::NoPlatformConfigDir) => {
            warn!("no platform config directory; using default configuration");
            Ok(AppConfig::default())
        }
        other => other,
    }
}

/// Loads `AppConfig` from an explicit path, returning defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `PeerScan` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PeerScan"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("peerscan"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PeerScan")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
