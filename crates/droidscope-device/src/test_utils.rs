//! Test utilities for device clients
//!
//! Provides [`FakeBridge`], a scripted [`DeviceBridge`] that records every call.

use std::sync::Mutex;

use droidscope_core::prelude::*;

use crate::bridge::DeviceBridge;

/// Reply of `service call window 3` when the ViewServer is running
pub const SERVICE_RUNNING_REPLY: &str = "Result: Parcel(00000000 00000001   '........')";

/// Reply of `service call window 3` when the ViewServer is stopped
pub const SERVICE_STOPPED_REPLY: &str = "Result: Parcel(00000000 00000000   '........')";

/// One recorded bridge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    Shell(String),
    Command(String),
    Spawn(String),
}

/// Scripted bridge: replies are matched by command prefix, unmatched commands reply `""`.
#[derive(Debug, Default)]
pub struct FakeBridge {
    shell_replies: Vec<(String, String)>,
    command_replies: Vec<(String, String)>,
    calls: Mutex<Vec<BridgeCall>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge on which the ViewServer is already running and forwarded to `local_port`.
    pub fn with_view_server(local_port: u16) -> Self {
        Self::new()
            .on_shell("service call window 3", SERVICE_RUNNING_REPLY)
            .on_command(
                "forward --list",
                format!("emulator-5554 tcp:{local_port} tcp:4939\n"),
            )
    }

    /// Reply to shell commands starting with `prefix`.
    pub fn on_shell(mut self, prefix: impl Into<String>, reply: impl Into<String>) -> Self {
        self.shell_replies.push((prefix.into(), reply.into()));
        self
    }

    /// Reply to host commands starting with `prefix`.
    pub fn on_command(mut self, prefix: impl Into<String>, reply: impl Into<String>) -> Self {
        self.command_replies.push((prefix.into(), reply.into()));
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.lock().clone()
    }

    pub fn shell_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Shell(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn command_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Command(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BridgeCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BridgeCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn reply_for(replies: &[(String, String)], command: &str) -> String {
    replies
        .iter()
        .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        .map(|(_, reply)| reply.clone())
        .unwrap_or_default()
}

impl DeviceBridge for FakeBridge {
    async fn shell(&self, command: &str) -> Result<String> {
        self.record(BridgeCall::Shell(command.to_string()));
        Ok(reply_for(&self.shell_replies, command))
    }

    async fn command(&self, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        let reply = reply_for(&self.command_replies, &command);
        self.record(BridgeCall::Command(command));
        Ok(reply)
    }

    async fn spawn_shell(&self, command: &str) -> Result<()> {
        self.record(BridgeCall::Spawn(command.to_string()));
        Ok(())
    }
}
