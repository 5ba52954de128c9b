//! # UiAutomator
//!
//! Device and object level actions, each sent as one JSON-RPC call to the
//! UiAutomator agent running under instrumentation on the device.
//!
//! [`UiAutomator::setup`] installs the agent APKs if missing, forwards its port
//! and launches the instrumentation. [`UiObject`] binds a [`Selector`] to an
//! automator; the selector travels as the first RPC argument.

use std::path::PathBuf;

use droidscope_core::prelude::*;
use droidscope_core::{Selector, ViewNode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bridge::{is_port_forwarded, DeviceBridge};
use crate::rpc::RpcClient;
use crate::view_server::ViewServer;

/// Port the agent listens on inside the device
pub const AGENT_PORT: u16 = 9008;

/// Package name prefix of the installed agent
pub const AGENT_PACKAGE: &str = "com.github.uiautomator";

/// Agent APKs, installed in this order
pub const AGENT_APKS: [&str; 2] = ["app-uiautomator.apk", "app-uiautomator-test.apk"];

/// Instrumentation that hosts the agent's RPC server
pub const INSTRUMENT_COMMAND: &str =
    "am instrument -w com.github.uiautomator.test/android.support.test.runner.AndroidJUnitRunner";

const NO_ARGS: [Value; 0] = [];

pub const DEFAULT_STEPS: u32 = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_MAX_SWIPES: u32 = 1000;
pub const DEFAULT_PINCH_PERCENT: u32 = 100;
pub const DEFAULT_PINCH_STEPS: u32 = 50;

/// Agent ports and APK location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiAutomatorConfig {
    pub local_port: u16,
    pub device_port: u16,
    pub apk_dir: PathBuf,
}

impl Default for UiAutomatorConfig {
    fn default() -> Self {
        Self {
            local_port: AGENT_PORT,
            device_port: AGENT_PORT,
            apk_dir: PathBuf::from("setup"),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument types
// ---------------------------------------------------------------------------

/// Scroll and fling axis. Sent as `true` for vertical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl Orientation {
    fn is_vertical(self) -> bool {
        self == Orientation::Vertical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl std::str::FromStr for SwipeDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(Error::invalid_query(
                "direction",
                format!("expected up, down, left or right, got '{other}'"),
            )),
        }
    }
}

/// Corner to click instead of the object's center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClickCorner {
    #[serde(rename = "tl")]
    TopLeft,
    #[serde(rename = "br")]
    BottomRight,
}

// ---------------------------------------------------------------------------
// UiAutomator
// ---------------------------------------------------------------------------

/// Device-level UiAutomator actions.
pub struct UiAutomator<B> {
    bridge: B,
    rpc: RpcClient,
    view_server: Option<ViewServer<B>>,
}

impl<B: DeviceBridge> UiAutomator<B> {
    /// Install, forward and launch the agent, then connect to it.
    pub async fn setup(bridge: B, config: UiAutomatorConfig) -> Result<Self> {
        let packages = bridge.shell("pm list packages -f").await?;
        if !packages.contains(AGENT_PACKAGE) {
            info!("Installing UiAutomator agent from {}", config.apk_dir.display());
            for apk in AGENT_APKS {
                let path = config.apk_dir.join(apk);
                let path = path.to_string_lossy();
                bridge.command(&["install", &path]).await?;
            }
        }

        let forwards = bridge.command(&["forward", "--list"]).await?;
        if !is_port_forwarded(&forwards, config.local_port) {
            let local = format!("tcp:{}", config.local_port);
            let device = format!("tcp:{}", config.device_port);
            bridge.command(&["forward", &local, &device]).await?;
        }

        info!("Launching UiAutomator agent on port {}", config.local_port);
        bridge.spawn_shell(INSTRUMENT_COMMAND).await?;

        Ok(Self::with_rpc(bridge, RpcClient::new(config.local_port)?))
    }

    /// Use an already running agent reachable through `rpc`.
    pub fn with_rpc(bridge: B, rpc: RpcClient) -> Self {
        Self {
            bridge,
            rpc,
            view_server: None,
        }
    }

    /// Attach a ViewServer so objects can report [`UiObject::full_info`].
    pub fn attach_view_server(&mut self, view_server: ViewServer<B>) {
        self.view_server = Some(view_server);
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn view_server(&self) -> Option<&ViewServer<B>> {
        self.view_server.as_ref()
    }

    /// Display and product information (`deviceInfo`).
    pub async fn info(&self) -> Result<Value> {
        self.rpc.call("deviceInfo", json!([])).await
    }

    pub async fn click(&self, x: i32, y: i32) -> Result<()> {
        self.rpc.call("click", json!([x, y])).await?;
        Ok(())
    }

    /// Press and hold, expressed as a one-pixel swipe.
    pub async fn long_click(&self, x: i32, y: i32) -> Result<()> {
        self.swipe(x, y, x + 1, y + 1, None).await
    }

    pub async fn swipe(&self, sx: i32, sy: i32, ex: i32, ey: i32, steps: Option<u32>) -> Result<()> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        self.rpc.call("swipe", json!([sx, sy, ex, ey, steps])).await?;
        Ok(())
    }

    pub async fn drag(&self, sx: i32, sy: i32, ex: i32, ey: i32, steps: Option<u32>) -> Result<()> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        self.rpc.call("drag", json!([sx, sy, ex, ey, steps])).await?;
        Ok(())
    }

    /// Freeze or unfreeze screen rotation.
    pub async fn freeze(&self, freeze: bool) -> Result<()> {
        self.rpc.call("freeze", json!([freeze])).await?;
        Ok(())
    }

    /// Bind `selector` to this automator.
    pub fn find(&self, selector: Selector) -> UiObject<'_, B> {
        UiObject {
            automator: self,
            selector,
        }
    }
}

// ---------------------------------------------------------------------------
// UiObject
// ---------------------------------------------------------------------------

/// A selector bound to a [`UiAutomator`].
pub struct UiObject<'a, B> {
    automator: &'a UiAutomator<B>,
    selector: Selector,
}

impl<'a, B: DeviceBridge> UiObject<'a, B> {
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Object matched by `query` among this object's children.
    pub fn child(&self, query: Selector) -> Self {
        let mut selector = self.selector.clone();
        selector.child(query);
        self.derive(selector)
    }

    /// Object matched by `query` among this object's siblings.
    pub fn sibling(&self, query: Selector) -> Self {
        let mut selector = self.selector.clone();
        selector.sibling(query);
        self.derive(selector)
    }

    /// The `index`-th instance of this object.
    pub fn at(&self, index: u32) -> Result<Self> {
        let mut selector = self.selector.clone();
        selector.set("instance", index)?;
        Ok(self.derive(selector))
    }

    fn derive(&self, selector: Selector) -> Self {
        Self {
            automator: self.automator,
            selector,
        }
    }

    async fn call(&self, method: &str, extra: impl IntoIterator<Item = Value>) -> Result<Value> {
        let mut params = vec![self.selector.to_json()?];
        params.extend(extra);
        self.automator.rpc.call(method, Value::Array(params)).await
    }

    async fn call_bool(&self, method: &str, extra: impl IntoIterator<Item = Value>) -> Result<bool> {
        let value = self.call(method, extra).await?;
        value
            .as_bool()
            .ok_or_else(|| Error::protocol(format!("{method} returned {value}, expected a boolean")))
    }

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    /// Accessibility info of the first match (`objInfo`).
    pub async fn info(&self) -> Result<Value> {
        self.call("objInfo", NO_ARGS).await
    }

    pub async fn count(&self) -> Result<u64> {
        let value = self.call("count", NO_ARGS).await?;
        value
            .as_u64()
            .ok_or_else(|| Error::protocol(format!("count returned {value}, expected an integer")))
    }

    pub async fn exists(&self) -> Result<bool> {
        self.call_bool("exist", NO_ARGS).await
    }

    /// Full dumped properties of the object via the attached ViewServer.
    pub async fn full_info(&self) -> Result<Option<ViewNode>> {
        let view_server = self.automator.view_server.as_ref().ok_or_else(|| {
            Error::config("attach a ViewServer to get full information about an object")
        })?;
        view_server.find_view_focused(&self.selector).await
    }

    // ─────────────────────────────────────────────────────────────
    // Gestures
    // ─────────────────────────────────────────────────────────────

    pub async fn click(&self, corner: Option<ClickCorner>) -> Result<()> {
        let extra = corner.map(|c| json!(c));
        self.call("click", extra).await?;
        Ok(())
    }

    /// Click and wait up to `timeout_ms` for a new window.
    pub async fn click_and_wait(&self, timeout_ms: u64) -> Result<()> {
        self.call("click", [json!(timeout_ms)]).await?;
        Ok(())
    }

    pub async fn pinch_in(&self, percent: Option<u32>, steps: Option<u32>) -> Result<()> {
        self.pinch("pinchIn", percent, steps).await
    }

    pub async fn pinch_out(&self, percent: Option<u32>, steps: Option<u32>) -> Result<()> {
        self.pinch("pinchOut", percent, steps).await
    }

    async fn pinch(&self, method: &str, percent: Option<u32>, steps: Option<u32>) -> Result<()> {
        let percent = percent.unwrap_or(DEFAULT_PINCH_PERCENT);
        let steps = steps.unwrap_or(DEFAULT_PINCH_STEPS);
        self.call(method, [json!(percent), json!(steps)]).await?;
        Ok(())
    }

    pub async fn swipe(&self, direction: SwipeDirection, steps: Option<u32>) -> Result<()> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        self.call("swipe", [json!(direction), json!(steps)]).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Waits
    // ─────────────────────────────────────────────────────────────

    pub async fn wait_until_gone(&self, timeout_ms: Option<u64>) -> Result<()> {
        let timeout = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        self.call("waitUntilGone", [json!(timeout)]).await?;
        Ok(())
    }

    pub async fn wait_for_exists(&self, timeout_ms: Option<u64>) -> Result<()> {
        let timeout = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        self.call("waitForExists", [json!(timeout)]).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Fling & scroll
    // ─────────────────────────────────────────────────────────────

    pub async fn fling_forward(&self, orientation: Orientation) -> Result<()> {
        self.call("flingForward", [json!(orientation.is_vertical())]).await?;
        Ok(())
    }

    pub async fn fling_backward(&self, orientation: Orientation) -> Result<()> {
        self.call("flingBackward", [json!(orientation.is_vertical())]).await?;
        Ok(())
    }

    pub async fn fling_to_beginning(&self, orientation: Orientation, max_swipes: Option<u32>) -> Result<()> {
        let max_swipes = max_swipes.unwrap_or(DEFAULT_MAX_SWIPES);
        self.call("flingToBeginning", [json!(orientation.is_vertical()), json!(max_swipes)])
            .await?;
        Ok(())
    }

    pub async fn fling_to_end(&self, orientation: Orientation, max_swipes: Option<u32>) -> Result<()> {
        let max_swipes = max_swipes.unwrap_or(DEFAULT_MAX_SWIPES);
        self.call("flingToEnd", [json!(orientation.is_vertical()), json!(max_swipes)])
            .await?;
        Ok(())
    }

    /// Scroll one step forward; `false` once the end is reached.
    pub async fn scroll_forward(&self, orientation: Orientation, steps: Option<u32>) -> Result<bool> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        self.call_bool("scrollForward", [json!(orientation.is_vertical()), json!(steps)])
            .await
    }

    pub async fn scroll_backward(&self, orientation: Orientation, steps: Option<u32>) -> Result<bool> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        self.call_bool("scrollBackward", [json!(orientation.is_vertical()), json!(steps)])
            .await
    }

    pub async fn scroll_to_beginning(
        &self,
        orientation: Orientation,
        steps: Option<u32>,
        max_swipes: Option<u32>,
    ) -> Result<bool> {
        self.scroll_to("scrollToBeginning", orientation, steps, max_swipes).await
    }

    pub async fn scroll_to_end(
        &self,
        orientation: Orientation,
        steps: Option<u32>,
        max_swipes: Option<u32>,
    ) -> Result<bool> {
        self.scroll_to("scrollToEnd", orientation, steps, max_swipes).await
    }

    async fn scroll_to(
        &self,
        method: &str,
        orientation: Orientation,
        steps: Option<u32>,
        max_swipes: Option<u32>,
    ) -> Result<bool> {
        let steps = steps.unwrap_or(DEFAULT_STEPS);
        let max_swipes = max_swipes.unwrap_or(DEFAULT_MAX_SWIPES);
        self.call_bool(
            method,
            [json!(orientation.is_vertical()), json!(max_swipes), json!(steps)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RPC_PATH;
    use crate::test_utils::{BridgeCall, FakeBridge};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn expect_call(server: &MockServer, rpc_method: &str, params: Value, result: Value) {
        Mock::given(method("POST"))
            .and(path(RPC_PATH))
            .and(body_partial_json(json!({"method": rpc_method, "params": params})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "result": result})))
            .expect(1)
            .mount(server)
            .await;
    }

    fn automator(server: &MockServer) -> UiAutomator<FakeBridge> {
        let rpc = RpcClient::with_endpoint(format!("{}{}", server.uri(), RPC_PATH)).unwrap();
        UiAutomator::with_rpc(FakeBridge::new(), rpc)
    }

    fn button() -> Selector {
        Selector::from_query([("className", "android.widget.Button")]).unwrap()
    }

    #[tokio::test]
    async fn test_setup_installs_forwards_and_launches() {
        let bridge = FakeBridge::new().on_shell("pm list packages", "package:/system/app/Foo.apk=com.foo");
        let config = UiAutomatorConfig {
            apk_dir: PathBuf::from("/opt/agent"),
            ..Default::default()
        };

        let automator = UiAutomator::setup(bridge, config).await.unwrap();

        assert_eq!(
            automator.bridge().calls(),
            vec![
                BridgeCall::Shell("pm list packages -f".into()),
                BridgeCall::Command("install /opt/agent/app-uiautomator.apk".into()),
                BridgeCall::Command("install /opt/agent/app-uiautomator-test.apk".into()),
                BridgeCall::Command("forward --list".into()),
                BridgeCall::Command("forward tcp:9008 tcp:9008".into()),
                BridgeCall::Spawn(INSTRUMENT_COMMAND.into()),
            ]
        );
        assert_eq!(automator.rpc().endpoint(), "http://localhost:9008/jsonrpc/0");
    }

    #[tokio::test]
    async fn test_setup_skips_install_and_forward_when_present() {
        let bridge = FakeBridge::new()
            .on_shell("pm list packages", "package:/data/app/x.apk=com.github.uiautomator")
            .on_command("forward --list", "emulator-5554 tcp:9008 tcp:9008");

        let automator = UiAutomator::setup(bridge, UiAutomatorConfig::default())
            .await
            .unwrap();

        assert_eq!(automator.bridge().command_calls(), vec!["forward --list"]);
    }

    #[tokio::test]
    async fn test_device_actions() {
        let server = MockServer::start().await;
        expect_call(&server, "deviceInfo", json!([]), json!({"displayWidth": 1080})).await;
        expect_call(&server, "click", json!([10, 20]), json!(true)).await;
        expect_call(&server, "swipe", json!([10, 20, 11, 21, 100]), json!(true)).await;
        expect_call(&server, "drag", json!([0, 0, 50, 50, 10]), json!(true)).await;
        expect_call(&server, "freeze", json!([true]), Value::Null).await;

        let automator = automator(&server);
        let info = automator.info().await.unwrap();
        assert_eq!(info["displayWidth"], 1080);
        automator.click(10, 20).await.unwrap();
        automator.long_click(10, 20).await.unwrap();
        automator.drag(0, 0, 50, 50, Some(10)).await.unwrap();
        automator.freeze(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_object_queries_send_selector() {
        let server = MockServer::start().await;
        let sel = button().to_json().unwrap();
        expect_call(&server, "count", json!([sel]), json!(3)).await;
        expect_call(&server, "exist", json!([sel]), json!(true)).await;
        expect_call(&server, "objInfo", json!([sel]), json!({"className": "android.widget.Button"})).await;

        let automator = automator(&server);
        let object = automator.find(button());
        assert_eq!(object.count().await.unwrap(), 3);
        assert!(object.exists().await.unwrap());
        assert_eq!(object.info().await.unwrap()["className"], "android.widget.Button");
    }

    #[tokio::test]
    async fn test_object_gestures() {
        let server = MockServer::start().await;
        let sel = button().to_json().unwrap();
        expect_call(&server, "click", json!([sel, "br"]), json!(true)).await;
        expect_call(&server, "click", json!([sel, 500]), json!(true)).await;
        expect_call(&server, "pinchIn", json!([sel, 100, 50]), json!(true)).await;
        expect_call(&server, "swipe", json!([sel, "left", 20]), json!(true)).await;
        expect_call(&server, "waitForExists", json!([sel, 3000]), json!(true)).await;

        let automator = automator(&server);
        let object = automator.find(button());
        object.click(Some(ClickCorner::BottomRight)).await.unwrap();
        object.click_and_wait(500).await.unwrap();
        object.pinch_in(None, None).await.unwrap();
        object.swipe(SwipeDirection::Left, Some(20)).await.unwrap();
        object.wait_for_exists(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_fling_and_scroll_arguments() {
        let server = MockServer::start().await;
        let sel = button().to_json().unwrap();
        expect_call(&server, "flingForward", json!([sel, true]), json!(true)).await;
        expect_call(&server, "flingToEnd", json!([sel, false, 1000]), json!(true)).await;
        expect_call(&server, "scrollBackward", json!([sel, true, 100]), json!(false)).await;
        expect_call(&server, "scrollToBeginning", json!([sel, true, 1000, 30]), json!(true)).await;

        let automator = automator(&server);
        let object = automator.find(button());
        object.fling_forward(Orientation::Vertical).await.unwrap();
        object.fling_to_end(Orientation::Horizontal, None).await.unwrap();
        assert!(!object.scroll_backward(Orientation::Vertical, None).await.unwrap());
        assert!(object
            .scroll_to_beginning(Orientation::Vertical, Some(30), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_remote_exception_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "not found", "data": {"exceptionTypeName": "UiObjectNotFoundException"}}
            })))
            .mount(&server)
            .await;

        let automator = automator(&server);
        let err = automator.find(button()).click(None).await.unwrap_err();
        assert!(matches!(err, Error::Remote { ref exception, .. } if exception == "UiObjectNotFoundException"));
    }

    #[test]
    fn test_child_sibling_and_at_leave_receiver_untouched() {
        let rpc = RpcClient::new(AGENT_PORT).unwrap();
        let automator = UiAutomator::with_rpc(FakeBridge::new(), rpc);
        let list = automator.find(Selector::from_query([("className", "android.widget.ListView")]).unwrap());

        let item = list.child(Selector::from_query([("text", "Item")]).unwrap());
        let third = list.at(2).unwrap();
        let next = list.sibling(Selector::new());

        assert!(list.selector().chain().is_empty());
        assert!(list.selector().get("instance").is_none());
        assert_eq!(item.selector().chain().len(), 1);
        assert_eq!(third.selector().get("instance"), Some(&droidscope_core::FieldValue::Int(2)));
        assert_eq!(next.selector().chain()[0].0, droidscope_core::Relation::Sibling);
    }

    #[tokio::test]
    async fn test_full_info_requires_view_server() {
        let rpc = RpcClient::new(AGENT_PORT).unwrap();
        let automator = UiAutomator::with_rpc(Arc::new(FakeBridge::new()), rpc);
        let err = automator.find(button()).full_info().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_full_info_uses_attached_view_server() {
        let bridge = Arc::new(FakeBridge::new());
        let rpc = RpcClient::new(AGENT_PORT).unwrap();
        let mut automator = UiAutomator::with_rpc(bridge.clone(), rpc);
        automator.attach_view_server(ViewServer::new(bridge.clone()));

        // No focused window in the fake dumpsys output.
        let err = automator.find(button()).full_info().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(bridge.shell_calls(), vec!["dumpsys window windows"]);
    }

    #[test]
    fn test_swipe_direction_from_str() {
        assert_eq!("up".parse::<SwipeDirection>().unwrap(), SwipeDirection::Up);
        assert!("diagonal".parse::<SwipeDirection>().is_err());
    }
}
