//! ViewServer dump client
//!
//! Talks to the window manager's built-in ViewServer over a forwarded TCP port.
//! One connection carries one command (`DUMP <window>` or `PROTOCOL`); the server
//! writes its reply and closes the socket, ending dumps with `DONE.\nDONE\n`.

use std::sync::LazyLock;

use droidscope_core::prelude::*;
use droidscope_core::{Selector, ViewNode, ViewTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::bridge::{is_port_forwarded, DeviceBridge};

/// Host port the ViewServer is forwarded to
pub const DEFAULT_LOCAL_PORT: u16 = 14949;

/// Port the ViewServer listens on inside the device
pub const DEFAULT_DEVICE_PORT: u16 = 4939;

const TERMINATOR: &str = "DONE.\nDONE\n";

static FOCUSED_WINDOW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mCurrentFocus=Window\{([\w\d]+)").expect("focused window regex is valid")
});

/// Port pair for the ViewServer relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewServerConfig {
    pub local_port: u16,
    pub device_port: u16,
}

impl Default for ViewServerConfig {
    fn default() -> Self {
        Self {
            local_port: DEFAULT_LOCAL_PORT,
            device_port: DEFAULT_DEVICE_PORT,
        }
    }
}

/// Dumps view hierarchies from a device's ViewServer.
#[derive(Debug)]
pub struct ViewServer<B> {
    bridge: B,
    config: ViewServerConfig,
}

impl<B: DeviceBridge> ViewServer<B> {
    pub fn new(bridge: B) -> Self {
        Self::with_config(bridge, ViewServerConfig::default())
    }

    pub fn with_config(bridge: B, config: ViewServerConfig) -> Self {
        Self { bridge, config }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn config(&self) -> &ViewServerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────
    // Service lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Whether the service is running and its port is forwarded.
    pub async fn is_started(&self) -> Result<bool> {
        let status = self.bridge.shell("service call window 3").await?;
        if !status.contains("00000001") {
            return Ok(false);
        }

        let forwards = self.bridge.command(&["forward", "--list"]).await?;
        Ok(is_port_forwarded(&forwards, self.config.local_port))
    }

    /// Restart the service on the device port and forward it.
    pub async fn start(&self) -> Result<()> {
        info!(
            "Starting ViewServer (tcp:{} -> device tcp:{})",
            self.config.local_port, self.config.device_port
        );

        self.bridge.shell("service call window 2").await?;
        self.bridge
            .shell(&format!("service call window 1 i32 {}", self.config.device_port))
            .await?;
        let local = format!("tcp:{}", self.config.local_port);
        let device = format!("tcp:{}", self.config.device_port);
        self.bridge.command(&["forward", &local, &device]).await?;
        Ok(())
    }

    /// Start the service unless it is already running and forwarded.
    pub async fn ensure_started(&self) -> Result<()> {
        if self.is_started().await? {
            trace!("ViewServer already running");
            return Ok(());
        }
        self.start().await
    }

    // ─────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────

    /// Send one command and return the full reply, terminator stripped.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] if the connection fails before the server closes it,
    /// [`Error::Protocol`] if the reply is empty.
    pub async fn send(&self, command: &str) -> Result<String> {
        self.ensure_started().await?;

        let mut stream = self.connect(command).await?;
        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|e| Error::transport(format!("reading reply to '{command}': {e}")))?;

        debug!("ViewServer replied {} bytes to '{}'", raw.len(), command);

        let text = String::from_utf8_lossy(&raw);
        let reply = strip_reply(&text);
        if reply.is_empty() {
            return Err(Error::protocol(format!("empty reply to '{command}'")));
        }
        Ok(reply.to_string())
    }

    /// Raw dump text of `window_id`.
    pub async fn dump_raw(&self, window_id: &str) -> Result<String> {
        self.send(&format!("DUMP {window_id}")).await
    }

    /// Dump `window_id` and rebuild its view tree.
    pub async fn dump(&self, window_id: &str) -> Result<ViewTree> {
        let text = self.dump_raw(window_id).await?;
        ViewTree::from_dump(&text)
    }

    /// First view in `window_id` matched by `selector`.
    ///
    /// Lines are parsed as they arrive and the connection is dropped at the first
    /// match, without building a tree. The returned node has no parent or children.
    pub async fn find_view(&self, window_id: &str, selector: &Selector) -> Result<Option<ViewNode>> {
        let predicate = selector.compile();
        self.ensure_started().await?;

        let command = format!("DUMP {window_id}");
        let stream = self.connect(&command).await?;
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        // Indent columns of the currently open ancestors
        let mut open: Vec<usize> = Vec::new();
        let mut seen_any = false;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| Error::transport(format!("reading reply to '{command}': {e}")))?;
            if read == 0 {
                break;
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() || is_terminator_line(line) {
                continue;
            }
            seen_any = true;

            let indent = line.len() - line.trim_start_matches(' ').len();
            while open.last().is_some_and(|&column| column >= indent) {
                open.pop();
            }
            open.push(indent);

            let mut node = ViewNode::parse(line)?;
            if predicate.matches(&node) {
                node.level = open.len();
                debug!("Found {} in window {}", node, window_id);
                return Ok(Some(node));
            }
        }

        if !seen_any {
            return Err(Error::protocol(format!("empty reply to '{command}'")));
        }
        Ok(None)
    }

    /// ViewServer protocol version.
    pub async fn protocol_version(&self) -> Result<u32> {
        let reply = self.send("PROTOCOL").await?;
        reply
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("non-numeric protocol version '{}'", reply.trim())))
    }

    // ─────────────────────────────────────────────────────────────
    // Focused window
    // ─────────────────────────────────────────────────────────────

    /// Hash id of the window that currently has focus.
    pub async fn focused_window_id(&self) -> Result<String> {
        let windows = self.bridge.shell("dumpsys window windows").await?;
        parse_focused_window(&windows)
            .ok_or_else(|| Error::protocol("no mCurrentFocus window in dumpsys output"))
    }

    pub async fn dump_focused(&self) -> Result<ViewTree> {
        let window = self.focused_window_id().await?;
        self.dump(&window).await
    }

    pub async fn find_view_focused(&self, selector: &Selector) -> Result<Option<ViewNode>> {
        let window = self.focused_window_id().await?;
        self.find_view(&window, selector).await
    }

    async fn connect(&self, command: &str) -> Result<TcpStream> {
        let addr = ("127.0.0.1", self.config.local_port);
        let mut stream = TcpStream::connect(addr).await.map_err(|e| {
            Error::transport(format!(
                "connecting to ViewServer on 127.0.0.1:{}: {}",
                self.config.local_port, e
            ))
        })?;

        stream
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| Error::transport(format!("sending '{command}': {e}")))?;
        trace!("Sent '{}' to ViewServer", command);

        Ok(stream)
    }
}

/// Strip the `DONE.\nDONE\n` terminator, then one trailing newline.
pub fn strip_reply(reply: &str) -> &str {
    let reply = reply.strip_suffix(TERMINATOR).unwrap_or(reply);
    reply.strip_suffix('\n').unwrap_or(reply)
}

fn is_terminator_line(line: &str) -> bool {
    line == "DONE." || line == "DONE"
}

/// Extract the focused window id from `dumpsys window windows` output.
pub fn parse_focused_window(dumpsys: &str) -> Option<String> {
    FOCUSED_WINDOW_REGEX
        .captures(dumpsys)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
