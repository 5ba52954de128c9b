//! # droidscope-device - Device Protocol Clients
//!
//! Talks to an attached Android device: adb command execution, ViewServer
//! hierarchy dumps over a forwarded socket, and UiAutomator actions over HTTP
//! JSON-RPC.
//!
//! Depends on [`droidscope_core`] for the view tree, selectors and error handling.
//!
//! ## Public API
//!
//! ### Device Bridge
//! - [`DeviceBridge`] - `shell`/`command` seam every client talks through
//! - [`AdbBridge`] - Implementation backed by the `adb` executable
//! - [`find_adb()`] - Locate adb via config, `ANDROID_HOME` or `PATH`
//! - [`AdbDevice`] - Parsed `adb devices` entry
//!
//! ### ViewServer
//! - [`ViewServer`] - Start the service, dump windows, find views
//! - [`ViewServerConfig`] - Local/device port pair
//!
//! ### JSON-RPC
//! - [`RpcClient`] - JSON-RPC 2.0 over HTTP with remote exception mapping
//!
//! ### UiAutomator
//! - [`UiAutomator`] - Agent setup and device-level gestures
//! - [`UiObject`] - Selector-bound object actions (click, scroll, fling, wait)

pub mod bridge;
pub mod rpc;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod uiautomator;
pub mod view_server;

pub use bridge::{
    find_adb, is_port_forwarded, parse_devices_output, AdbBridge, AdbDevice, DeviceBridge,
};
pub use rpc::{RpcClient, RpcRequest, RpcResponse};
pub use uiautomator::{
    ClickCorner, Orientation, SwipeDirection, UiAutomator, UiAutomatorConfig, UiObject,
};
pub use view_server::{ViewServer, ViewServerConfig};
