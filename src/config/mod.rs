//! Configuration file parsing for droidscope
//!
//! Supports `.droidscope/config.toml` in the project directory.

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings, resolve_serial, CONFIG_FILENAME, DROIDSCOPE_DIR};
pub use types::*;
