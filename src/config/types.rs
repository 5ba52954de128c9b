//! Configuration types for droidscope
//!
//! Defines:
//! - `Settings` - Contents of `.droidscope/config.toml`
//! - `DeviceSettings` - adb location and target device

use std::path::PathBuf;

use droidscope_device::{UiAutomatorConfig, ViewServerConfig};
use serde::{Deserialize, Serialize};

/// Global settings from `.droidscope/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub view_server: ViewServerConfig,

    #[serde(default)]
    pub uiautomator: UiAutomatorConfig,
}

/// Which adb to run and which device it should target
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceSettings {
    /// Device serial passed as `adb -s`; falls back to `$ANDROID_SERIAL`
    #[serde(default)]
    pub serial: Option<String>,

    /// Explicit adb executable; otherwise `$ANDROID_HOME` or `PATH`
    #[serde(default)]
    pub adb_path: Option<PathBuf>,
}
