//! Device bridge: the adb seam every protocol client talks through

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use droidscope_core::prelude::*;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;

/// Upper bound for a single adb invocation
const ADB_TIMEOUT: Duration = Duration::from_secs(30);

/// Host and device command execution.
///
/// `shell` runs on the device, `command` runs an adb host command such as
/// `["forward", "tcp:14949", "tcp:4939"]`. Host command arguments are passed
/// through as-is, so paths may contain spaces.
#[trait_variant::make(DeviceBridge: Send)]
pub trait LocalDeviceBridge {
    /// Run a device shell command and return its stdout
    async fn shell(&self, command: &str) -> Result<String>;

    /// Run an adb host command and return its stdout
    async fn command(&self, args: &[&str]) -> Result<String>;

    /// Start a long-running device shell command without waiting for it to exit
    async fn spawn_shell(&self, command: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// AdbBridge
// ---------------------------------------------------------------------------

/// [`DeviceBridge`] backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb: PathBuf,
    serial: Option<String>,
}

impl AdbBridge {
    pub fn new(adb: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            adb: adb.into(),
            serial,
        }
    }

    /// Locate adb (see [`find_adb`]) and target `serial`, or adb's default device.
    pub fn locate(configured: Option<&Path>, serial: Option<String>) -> Result<Self> {
        Ok(Self::new(find_adb(configured)?, serial))
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// List attached devices via `adb devices`.
    pub async fn list_devices(&self) -> Result<Vec<AdbDevice>> {
        let output = self.run(&["devices"], false).await?;
        let devices = parse_devices_output(&output);
        debug!("adb reports {} device(s)", devices.len());
        Ok(devices)
    }

    /// Fail with [`Error::NoDevice`] unless the target device is online.
    pub async fn ensure_device(&self) -> Result<()> {
        let devices = self.list_devices().await?;
        let online = devices.iter().filter(|d| d.is_online());

        let found = match &self.serial {
            Some(serial) => online.into_iter().any(|d| &d.serial == serial),
            None => online.count() > 0,
        };

        if found {
            Ok(())
        } else {
            warn!("No online device (serial: {:?})", self.serial);
            Err(Error::NoDevice)
        }
    }

    fn base_command(&self, with_serial: bool) -> Command {
        let mut cmd = Command::new(&self.adb);
        if with_serial {
            if let Some(serial) = &self.serial {
                cmd.args(["-s", serial]);
            }
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn run(&self, args: &[&str], with_serial: bool) -> Result<String> {
        debug!("adb {}", args.join(" "));

        let output = timeout(
            ADB_TIMEOUT,
            self.base_command(with_serial)
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| Error::process(format!("adb {} timed out", args.join(" "))))?
        .map_err(|e| spawn_error(&self.adb, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if is_no_device_message(&stderr) {
            return Err(Error::NoDevice);
        }
        if !output.status.success() {
            return Err(Error::process(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            trace!("adb stderr: {}", stderr.trim());
        }

        Ok(stdout)
    }
}

impl DeviceBridge for AdbBridge {
    async fn shell(&self, command: &str) -> Result<String> {
        self.run(&["shell", command], true).await
    }

    async fn command(&self, args: &[&str]) -> Result<String> {
        self.run(args, true).await
    }

    async fn spawn_shell(&self, command: &str) -> Result<()> {
        debug!("adb shell {} (background)", command);

        // Dropping the handle leaves the process running.
        self.base_command(true)
            .args(["shell", command])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&self.adb, e))?;
        Ok(())
    }
}

impl<B: DeviceBridge + Sync> DeviceBridge for Arc<B> {
    async fn shell(&self, command: &str) -> Result<String> {
        DeviceBridge::shell(self.as_ref(), command).await
    }

    async fn command(&self, args: &[&str]) -> Result<String> {
        DeviceBridge::command(self.as_ref(), args).await
    }

    async fn spawn_shell(&self, command: &str) -> Result<()> {
        DeviceBridge::spawn_shell(self.as_ref(), command).await
    }
}

/// Whether `adb forward --list` output forwards host `local_port`.
///
/// Lines read `<serial> tcp:<local> tcp:<remote>`; only the local column is compared.
pub fn is_port_forwarded(forward_list: &str, local_port: u16) -> bool {
    let local = format!("tcp:{local_port}");
    forward_list
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|column| column == local)
}

fn spawn_error(adb: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::AdbNotFound
    } else {
        Error::process(format!("Failed to run {}: {}", adb.display(), e))
    }
}

fn is_no_device_message(stderr: &str) -> bool {
    stderr.contains("no devices/emulators found")
        || (stderr.contains("device '") && stderr.contains("' not found"))
}

// ---------------------------------------------------------------------------
// adb discovery
// ---------------------------------------------------------------------------

/// Resolve the adb executable.
///
/// Order: `configured` (if it exists), `$ANDROID_HOME/platform-tools`,
/// `$ANDROID_SDK_ROOT/platform-tools`, then `PATH`.
pub fn find_adb(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured adb path {} does not exist, searching", path.display());
    }

    for candidate in sdk_adb_candidates() {
        if candidate.is_file() {
            debug!("Using adb from SDK: {}", candidate.display());
            return Ok(candidate);
        }
    }

    which::which("adb").map_err(|_| Error::AdbNotFound)
}

fn sdk_adb_candidates() -> Vec<PathBuf> {
    let exe = format!("adb{}", std::env::consts::EXE_SUFFIX);
    ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|home| PathBuf::from(home).join("platform-tools").join(&exe))
        .collect()
}

// ---------------------------------------------------------------------------
// adb devices
// ---------------------------------------------------------------------------

/// A device line from `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl AdbDevice {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Parse `adb devices` output.
pub fn parse_devices_output(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AdbDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_devices_output() {
        let output = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554\tdevice
R58M12ABCDE\tunauthorized

";
        let devices = parse_devices_output(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_online());
        assert_eq!(devices[1].state, "unauthorized");
        assert!(!devices[1].is_online());
    }

    #[test]
    fn test_parse_devices_output_empty() {
        assert!(parse_devices_output("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_no_device_messages() {
        assert!(is_no_device_message("error: no devices/emulators found"));
        assert!(is_no_device_message("error: device 'abc' not found"));
        assert!(!is_no_device_message("Warning: something else"));
    }

    #[test]
    fn test_find_adb_prefers_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let adb = dir.path().join("adb");
        std::fs::write(&adb, "").unwrap();

        assert_eq!(find_adb(Some(&adb)).unwrap(), adb);
    }

    #[test]
    #[serial]
    fn test_find_adb_uses_android_home() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("platform-tools");
        std::fs::create_dir_all(&tools).unwrap();
        let adb = tools.join(format!("adb{}", std::env::consts::EXE_SUFFIX));
        std::fs::write(&adb, "").unwrap();

        std::env::set_var("ANDROID_HOME", dir.path());
        let found = find_adb(Some(Path::new("/definitely/missing/adb")));
        std::env::remove_var("ANDROID_HOME");

        assert_eq!(found.unwrap(), adb);
    }

    #[test]
    #[serial]
    fn test_sdk_candidates_follow_env() {
        std::env::set_var("ANDROID_HOME", "/sdk/home");
        std::env::remove_var("ANDROID_SDK_ROOT");
        let candidates = sdk_adb_candidates();
        std::env::remove_var("ANDROID_HOME");

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].starts_with("/sdk/home/platform-tools"));
    }

    #[test]
    fn test_is_port_forwarded_matches_local_column_exactly() {
        let list = "emulator-5554 tcp:14949 tcp:4939\nemulator-5554 tcp:9008 tcp:9008\n";
        assert!(is_port_forwarded(list, 14949));
        assert!(is_port_forwarded(list, 9008));
        assert!(!is_port_forwarded(list, 4949));
        assert!(!is_port_forwarded(list, 4939));
        assert!(!is_port_forwarded("", 14949));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_keeps_arguments_with_spaces() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let adb = dir.path().join("adb");
        std::fs::write(&adb, "#!/bin/sh\nprintf '%s\\n' \"$@\"\n").unwrap();
        std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).unwrap();

        let bridge = AdbBridge::new(&adb, None);
        let output = DeviceBridge::command(&bridge, &["install", "/path with space/app.apk"])
            .await
            .unwrap();
        assert_eq!(output.lines().collect::<Vec<_>>(), vec!["install", "/path with space/app.apk"]);
    }

    #[tokio::test]
    async fn test_missing_adb_binary_is_adb_not_found() {
        let bridge = AdbBridge::new("/definitely/missing/adb", None);
        let err = DeviceBridge::shell(&bridge, "echo hi").await.unwrap_err();
        assert!(matches!(err, Error::AdbNotFound));
    }
}
