//! Settings loading and the default config file

use std::path::Path;

use droidscope_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "config.toml";
pub const DROIDSCOPE_DIR: &str = ".droidscope";

/// Environment variable adb itself reads for the target serial
const SERIAL_ENV_VAR: &str = "ANDROID_SERIAL";

/// Load settings from `.droidscope/config.toml`
///
/// Missing or unreadable files fall back to defaults.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(DROIDSCOPE_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Pick the device serial: command line, then config file, then `$ANDROID_SERIAL`.
pub fn resolve_serial(cli_serial: Option<String>, settings: &Settings) -> Option<String> {
    cli_serial
        .or_else(|| settings.device.serial.clone())
        .or_else(|| std::env::var(SERIAL_ENV_VAR).ok())
        .filter(|serial| !serial.trim().is_empty())
}

/// Create a commented default config file in `.droidscope/`
///
/// An existing file is left untouched.
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let config_dir = project_path.join(DROIDSCOPE_DIR);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| Error::config(format!("Failed to create .droidscope dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# droidscope configuration

[device]
# serial = "emulator-5554"    # Defaults to $ANDROID_SERIAL, then adb's only device
# adb_path = "/opt/android/platform-tools/adb"

[view_server]
local_port = 14949            # Host side of the port forward
device_port = 4939            # Port the ViewServer listens on in the device

[uiautomator]
local_port = 9008
device_port = 9008
apk_dir = "setup"             # Holds app-uiautomator.apk and app-uiautomator-test.apk
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}
