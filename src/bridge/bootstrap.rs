//! Bringing up the adb server.

use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Command, time::Instant};
use tracing::{debug, info};
use which::which;

use super::AdbBridge;
use crate::{config::tools_dir, error::BridgeStartError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(windows)]
const ADB_FILE: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_FILE: &str = "adb";

/// Make sure an adb server answers at the configured address.
///
/// # Errors
/// See [`BridgeStartError`] for each way this can fail.
pub async fn ensure_server(bridge: &AdbBridge) -> Result<(), BridgeStartError> {
    if let Ok(version) = bridge.server_version().await {
        debug!("adb server already running (protocol version {version})");
        return Ok(());
    }

    let config = bridge.config();
    let adb = locate_adb(config.adb_path.as_deref()).ok_or(BridgeStartError::AdbNotFound)?;
    info!("Starting adb server with {}", adb.display());

    let output = Command::new(&adb)
        .arg("-P")
        .arg(config.port.to_string())
        .arg("start-server")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| BridgeStartError::Spawn {
            path: adb.clone(),
            message: err.to_string(),
        })?;

    if !output.status.success() {
        debug!(
            "adb start-server stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(BridgeStartError::ServerExited {
            status: output.status.to_string(),
        });
    }

    wait_until_reachable(bridge).await
}

async fn wait_until_reachable(bridge: &AdbBridge) -> Result<(), BridgeStartError> {
    let limit = bridge.config().start_timeout();
    let started = Instant::now();
    loop {
        if let Ok(version) = bridge.server_version().await {
            info!("adb server is up (protocol version {version})");
            return Ok(());
        }
        let waited = started.elapsed();
        if waited >= limit {
            return Err(BridgeStartError::Unreachable {
                address: bridge.config().address(),
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Find an adb executable.
///
/// Tried in order: the configured path, `~/.scrcpy-viewer/adb`, `adb` on
/// `PATH`, then `platform-tools/adb` under each Android SDK root.
#[must_use]
pub fn locate_adb(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    if let Some(candidate) = tools_dir()
        .map(|dir| dir.join(ADB_FILE))
        .filter(|candidate| candidate.is_file())
    {
        return Some(candidate);
    }

    if let Ok(path) = which("adb") {
        return Some(path);
    }

    sdk_roots()
        .into_iter()
        .map(|root| root.join("platform-tools").join(ADB_FILE))
        .find(|candidate| candidate.is_file())
}

fn sdk_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut push = |path: PathBuf| {
        if path.exists() && !roots.contains(&path) {
            roots.push(path);
        }
    };

    if let Ok(path) = env::var("ANDROID_HOME") {
        push(PathBuf::from(path));
    }
    if let Ok(path) = env::var("ANDROID_SDK_ROOT") {
        push(PathBuf::from(path));
    }
    if let Some(home) = home::home_dir() {
        push(home.join("Library/Android/sdk"));
        push(home.join("Android/Sdk"));
    }
    roots
}
