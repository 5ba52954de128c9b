//! Application entry point: load settings, connect to the device, run one command

pub mod commands;

use std::io::Write;
use std::path::{Path, PathBuf};

use droidscope_core::prelude::*;
use droidscope_device::{AdbBridge, DeviceBridge, UiAutomator, ViewServer};

use crate::cli::{Cli, Command};
use crate::config::{load_settings, resolve_serial, Settings};

/// Run a parsed command line against the configured device.
pub async fn run(cli: Cli) -> Result<()> {
    let project = cli
        .project
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    info!("Project path: {}", project.display());

    let mut out = std::io::stdout().lock();

    if cli.command == Command::Init {
        return commands::init(&project, &mut out);
    }

    let settings = load_settings(&project);
    let serial = resolve_serial(cli.serial, &settings);
    let bridge = AdbBridge::locate(settings.device.adb_path.as_deref(), serial)
        .context("Locating adb")?;
    bridge
        .ensure_device()
        .await
        .with_context(|| format!("Checking device {}", bridge.serial().unwrap_or("<default>")))?;

    let result = execute(cli.command, bridge, &settings, &project, &mut out).await;
    if let Err(ref e) = result {
        error!("Command failed: {:?}", e);
    }
    result
}

/// Process exit status for a failed run.
///
/// `2` when no device can be reached at all (adb missing or no device
/// attached), `1` for every other failure.
pub fn exit_code(err: &Error) -> i32 {
    if err.is_fatal() {
        2
    } else {
        1
    }
}

/// Run `command` through `bridge`, writing its output to `out`.
pub async fn execute<B: DeviceBridge>(
    command: Command,
    bridge: B,
    settings: &Settings,
    project: &Path,
    out: &mut impl Write,
) -> Result<()> {
    debug!("Executing {:?}", command);

    match command {
        Command::Dump { window, raw } => {
            let server = ViewServer::with_config(bridge, settings.view_server);
            commands::dump(&server, window.as_deref(), raw, out).await
        }
        Command::Find { fields, window } => {
            let selector = commands::parse_selector(&fields)?;
            let server = ViewServer::with_config(bridge, settings.view_server);
            commands::find(&server, window.as_deref(), &selector, out).await
        }
        Command::Protocol => {
            let server = ViewServer::with_config(bridge, settings.view_server);
            commands::protocol(&server, out).await
        }
        Command::Info => {
            let automator = UiAutomator::setup(bridge, settings.uiautomator.clone()).await?;
            commands::info(&automator, out).await
        }
        Command::Click { x, y } => {
            let automator = UiAutomator::setup(bridge, settings.uiautomator.clone()).await?;
            commands::click(&automator, x, y, out).await
        }
        Command::Swipe {
            sx,
            sy,
            ex,
            ey,
            steps,
        } => {
            let automator = UiAutomator::setup(bridge, settings.uiautomator.clone()).await?;
            commands::swipe(&automator, (sx, sy), (ex, ey), steps, out).await
        }
        Command::Count { fields } => {
            let selector = commands::parse_selector(&fields)?;
            let automator = UiAutomator::setup(bridge, settings.uiautomator.clone()).await?;
            commands::count(&automator, selector, out).await
        }
        Command::Init => commands::init(project, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_separates_unreachable_device() {
        assert_eq!(exit_code(&Error::AdbNotFound), 2);
        assert_eq!(exit_code(&Error::NoDevice), 2);
        assert_eq!(exit_code(&Error::transport("refused")), 1);
        assert_eq!(exit_code(&Error::parse("k", "bad")), 1);
    }
}
