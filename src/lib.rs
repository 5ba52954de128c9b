//! droidscope library
//!
//! Command-line front end over [`droidscope_core`] (dump parsing, view trees,
//! selectors) and [`droidscope_device`] (adb, ViewServer, UiAutomator).

pub mod app;
pub mod cli;
pub mod config;

pub use app::{execute, exit_code, run};
pub use cli::{Cli, Command};
