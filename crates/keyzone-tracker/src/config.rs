//! TOML configuration for a keyzone session.
//!
//! The default location is platform dependent:
//! - Windows:  `%APPDATA%\Keyzone\config.toml`
//! - Linux:    `~/.config/keyzone/config.toml`
//! - macOS:    `~/Library/Application Support/Keyzone/config.toml`
//!
//! ```toml
//! [camera]
//! device_index = 0
//! width = 1280
//! height = 720
//! fourcc = "MJPG"
//! exposure = "auto"
//! focus = { fixed = 400.0 }
//!
//! [keyboard]
//! layout_path = "configs/keymap.drawio"
//! corners = [[10.0, 20.0], [642.0, 20.0], [598.0, 215.0], [51.0, 215.0]]
//!
//! [session]
//! mirror_handedness = true
//! rotate_180 = true
//! ```
//!
//! Every field has a default, so a missing file, a missing table or a missing
//! key all fall back to the values shown above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keyzone_camera::CameraConfig;
use keyzone_core::{load_layout, CameraQuad, FingertipResolver, GeometryError, LayoutError, FINGERTIP_IDS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

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
}

/// Error building the session resolver from [`KeyboardConfig`].
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to load keyboard layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("invalid keyboard corners: {0}")]
    Geometry(#[from] GeometryError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where the keyboard is and what it looks like.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyboardConfig {
    /// draw.io diagram describing the key rectangles. Relative paths are
    /// resolved against the working directory.
    #[serde(default = "default_layout_path")]
    pub layout_path: PathBuf,
    /// Camera-pixel corners of the keyboard frame, `[TL, TR, BR, BL]`.
    #[serde(default = "default_corners")]
    pub corners: CameraQuad,
}

/// Behaviour of the resolution loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Swap the detector's Left/Right labels (mirrored camera view).
    #[serde(default = "default_true")]
    pub mirror_handedness: bool,
    /// Rotate fingertip coordinates by 180° before mapping (camera mounted upside down).
    #[serde(default = "default_true")]
    pub rotate_180: bool,
    /// Landmark ids to resolve. Defaults to the five fingertips.
    #[serde(default = "default_fingertips")]
    pub fingertips: Vec<u32>,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long stopping the camera may take before giving up.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Sleep between polls when no new frame is available.
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

impl KeyboardConfig {
    /// Loads the layout diagram and builds the camera-to-layout resolver.
    pub fn build_resolver(&self) -> Result<FingertipResolver, SetupError> {
        let layout = load_layout(&self.layout_path)?;
        Ok(FingertipResolver::new(layout, self.corners)?)
    }
}

impl SessionConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_layout_path() -> PathBuf {
    PathBuf::from("configs/keymap.drawio")
}
fn default_corners() -> CameraQuad {
    CameraQuad::new([[10.0, 20.0], [642.0, 20.0], [598.0, 215.0], [51.0, 215.0]])
}
fn default_true() -> bool {
    true
}
fn default_fingertips() -> Vec<u32> {
    FINGERTIP_IDS.to_vec()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_idle_sleep_ms() -> u64 {
    1
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            layout_path: default_layout_path(),
            corners: default_corners(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mirror_handedness: default_true(),
            rotate_180: default_true(),
            fingertips: default_fingertips(),
            log_level: default_log_level(),
            stop_timeout_ms: default_stop_timeout_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
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

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}; using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
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

/// Resolves the platform config base directory including the `keyzone` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Keyzone"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keyzone"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Keyzone"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
