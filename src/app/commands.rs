//! Command handlers
//!
//! Each handler drives one client and writes human-readable output to `out`.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use droidscope_core::prelude::*;
use droidscope_core::Selector;
use droidscope_device::{DeviceBridge, UiAutomator, ViewServer};

use crate::config::{init_config_dir, CONFIG_FILENAME, DROIDSCOPE_DIR};

/// Attempts made while the freshly launched agent starts listening
const AGENT_READY_ATTEMPTS: u32 = 20;
const AGENT_READY_INTERVAL: Duration = Duration::from_millis(500);

/// Build a selector from `NAME=VALUE` arguments.
pub fn parse_selector(fields: &[String]) -> Result<Selector> {
    let mut selector = Selector::new();
    for field in fields {
        let (name, value) = field
            .split_once('=')
            .ok_or_else(|| Error::invalid_query(field.as_str(), "expected NAME=VALUE"))?;
        selector.set_parsed(name.trim(), value)?;
    }
    Ok(selector)
}

pub async fn dump<B: DeviceBridge>(
    server: &ViewServer<B>,
    window: Option<&str>,
    raw: bool,
    out: &mut impl Write,
) -> Result<()> {
    let window = match window {
        Some(window) => window.to_string(),
        None => server.focused_window_id().await?,
    };
    info!("Dumping window {}", window);

    if raw {
        writeln!(out, "{}", server.dump_raw(&window).await?)?;
    } else {
        let tree = server.dump(&window).await?;
        write!(out, "{}", tree.inspect())?;
    }
    Ok(())
}

pub async fn find<B: DeviceBridge>(
    server: &ViewServer<B>,
    window: Option<&str>,
    selector: &Selector,
    out: &mut impl Write,
) -> Result<()> {
    let found = match window {
        Some(window) => server.find_view(window, selector).await?,
        None => server.find_view_focused(selector).await?,
    };

    match found {
        Some(node) => writeln!(out, "{}", serde_json::to_string_pretty(&node)?)?,
        None => writeln!(out, "No view matches the query")?,
    }
    Ok(())
}

pub async fn protocol<B: DeviceBridge>(server: &ViewServer<B>, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", server.protocol_version().await?)?;
    Ok(())
}

/// Wait until the agent answers, then print its device info.
pub async fn info<B: DeviceBridge>(automator: &UiAutomator<B>, out: &mut impl Write) -> Result<()> {
    let info = wait_for_agent(automator).await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
    Ok(())
}

pub async fn click<B: DeviceBridge>(
    automator: &UiAutomator<B>,
    x: i32,
    y: i32,
    out: &mut impl Write,
) -> Result<()> {
    wait_for_agent(automator).await?;
    automator.click(x, y).await?;
    writeln!(out, "Clicked ({x}, {y})")?;
    Ok(())
}

pub async fn swipe<B: DeviceBridge>(
    automator: &UiAutomator<B>,
    from: (i32, i32),
    to: (i32, i32),
    steps: Option<u32>,
    out: &mut impl Write,
) -> Result<()> {
    wait_for_agent(automator).await?;
    automator.swipe(from.0, from.1, to.0, to.1, steps).await?;
    writeln!(out, "Swiped ({}, {}) -> ({}, {})", from.0, from.1, to.0, to.1)?;
    Ok(())
}

pub async fn count<B: DeviceBridge>(
    automator: &UiAutomator<B>,
    selector: Selector,
    out: &mut impl Write,
) -> Result<()> {
    wait_for_agent(automator).await?;
    let count = automator.find(selector).count().await?;
    writeln!(out, "{count}")?;
    Ok(())
}

pub fn init(project: &Path, out: &mut impl Write) -> Result<()> {
    init_config_dir(project)?;
    writeln!(
        out,
        "Config written to {}",
        project.join(DROIDSCOPE_DIR).join(CONFIG_FILENAME).display()
    )?;
    Ok(())
}

/// Poll `deviceInfo` until the agent accepts connections.
async fn wait_for_agent<B: DeviceBridge>(automator: &UiAutomator<B>) -> Result<serde_json::Value> {
    let mut attempt = 1;
    loop {
        match automator.info().await {
            Err(Error::Transport { message }) if attempt < AGENT_READY_ATTEMPTS => {
                trace!("Agent not ready (attempt {}): {}", attempt, message);
                attempt += 1;
                tokio::time::sleep(AGENT_READY_INTERVAL).await;
            }
            other => return other,
        }
    }
}
