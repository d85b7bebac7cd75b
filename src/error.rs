//! Error types shared across the crate.
//!
//! Only [`BridgeStartError`] ends the discovery stream. The other kinds are
//! contained: a [`FetchError`] drops one device from one snapshot and a
//! [`LaunchError`] becomes the status of one mirroring session.

use std::{io, path::PathBuf};

use serde::Serialize;

use crate::device::DeviceIdentity;

/// Transport-level failure while talking to the adb server.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The adb server could not be reached.
    #[error("failed to reach adb server at {address}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to an established connection failed.
    #[error("adb connection error: {0}")]
    Io(#[from] io::Error),

    /// The server did not answer in time.
    #[error("adb request `{request}` timed out")]
    Timeout {
        /// The request that timed out.
        request: String,
    },

    /// The server answered `FAIL`.
    #[error("adb server rejected `{request}`: {message}")]
    Rejected {
        /// The rejected request.
        request: String,
        /// Message sent along with `FAIL`.
        message: String,
    },

    /// The server sent bytes that do not follow the host protocol.
    #[error("malformed adb response: {0}")]
    Protocol(String),
}

/// The debug bridge could not be brought up. Fatal to discovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeStartError {
    /// No adb executable in any of the searched locations.
    #[error(
        "Failed to start debug bridge: no adb executable found (set `bridge.adb_path` or install the Android platform-tools)"
    )]
    AdbNotFound,

    /// The adb executable exists but could not be executed.
    #[error("Failed to start debug bridge: could not run {}: {message}", .path.display())]
    Spawn {
        /// Path of the adb executable.
        path: PathBuf,
        /// OS error description.
        message: String,
    },

    /// `adb start-server` returned a failure status.
    #[error("Failed to start debug bridge: `adb start-server` exited with {status}")]
    ServerExited {
        /// Exit status as reported by the OS.
        status: String,
    },

    /// The server was started but never answered.
    #[error("Failed to start debug bridge: server not reachable at {address} after {waited_ms} ms")]
    Unreachable {
        /// `host:port` that was polled.
        address: String,
        /// How long the bootstrap waited.
        waited_ms: u64,
    },

    /// The device tracking feed could not be opened.
    #[error("Failed to start debug bridge: could not subscribe to device events: {message}")]
    Subscribe {
        /// Description of the underlying [`BridgeError`].
        message: String,
    },
}

/// Property query for one device failed; the device is skipped this cycle.
#[derive(Debug, thiserror::Error)]
#[error("failed to query properties of {identity}: {source}")]
pub struct FetchError {
    /// Device whose properties were requested.
    pub identity: DeviceIdentity,
    /// Transport failure.
    #[source]
    pub source: BridgeError,
}

/// The mirroring executable could not be started for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("failed to launch `{program}` for {identity}: {reason}")]
pub struct LaunchError {
    /// Device the session was opened for.
    pub identity: DeviceIdentity,
    /// Executable that was invoked.
    pub program: String,
    /// OS error description.
    pub reason: String,
}

/// Configuration file could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// Configuration file path.
        path: PathBuf,
        /// Parser error with location.
        #[source]
        source: toml::de::Error,
    },
}
