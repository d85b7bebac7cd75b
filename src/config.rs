//! TOML configuration.
//!
//! Every field has a default, so a missing file, a missing section or a
//! missing key all fall back to the values documented on each field.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory holding the configuration file and privately installed tools.
pub const TOOLS_DIR: &str = ".scrcpy-viewer";

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_ADB_PORT: u16 = 5037;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[bridge]`
    pub bridge: BridgeConfig,
    /// `[discovery]`
    pub discovery: DiscoveryConfig,
    /// `[mirror]`
    pub mirror: MirrorConfig,
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise the built-in defaults.
    ///
    /// # Errors
    /// An explicitly given file must exist; the default file may be absent.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `~/.scrcpy-viewer/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        tools_dir().map(|dir| dir.join(CONFIG_FILE))
    }
}

/// `~/.scrcpy-viewer`, if the home directory is known.
#[must_use]
pub fn tools_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(TOOLS_DIR))
}

/// How to reach (and if needed start) the adb server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host the adb server listens on.
    pub host: String,
    /// Port the adb server listens on. Defaults to `ANDROID_ADB_SERVER_PORT`
    /// when set, otherwise 5037.
    pub port: u16,
    /// Explicit adb executable, tried before any lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adb_path: Option<PathBuf>,
    /// How long bootstrap waits for a freshly started server.
    pub start_timeout_ms: u64,
    /// Connect and I/O timeout for one request.
    pub request_timeout_ms: u64,
}

impl BridgeConfig {
    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bootstrap deadline.
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_port(),
            adb_path: None,
            start_timeout_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

fn default_port() -> u16 {
    env::var("ANDROID_ADB_SERVER_PORT")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_ADB_PORT)
}

/// Device discovery tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Capacity of the bounded device-event channel.
    pub channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
        }
    }
}

/// How mirroring processes are launched and stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Mirroring executable, looked up on `PATH` when not absolute.
    pub executable: String,
    /// Arguments placed before `-s <serial>`.
    pub extra_args: Vec<String>,
    /// Also collect stderr into the session log.
    pub capture_stderr: bool,
    /// Time between the terminate request and the forced kill.
    pub close_grace_ms: u64,
}

impl MirrorConfig {
    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            executable: "scrcpy".to_string(),
            extra_args: Vec::new(),
            capture_stderr: false,
            close_grace_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mirror.executable, "scrcpy");
        assert_eq!(config.discovery.channel_capacity, 16);
        assert_eq!(config.bridge.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bridge]
            port = 5038
            adb_path = "/opt/platform-tools/adb"

            [mirror]
            extra_args = ["--no-audio"]
            "#,
        )
        .unwrap();

        assert_eq!(config.bridge.port, 5038);
        assert_eq!(config.bridge.host, "127.0.0.1");
        assert_eq!(config.bridge.address(), "127.0.0.1:5038");
        assert_eq!(
            config.bridge.adb_path.as_deref(),
            Some(Path::new("/opt/platform-tools/adb"))
        );
        assert_eq!(config.mirror.extra_args, vec!["--no-audio".to_string()]);
        assert_eq!(config.mirror.executable, "scrcpy");
        assert_eq!(config.mirror.close_grace_ms, 500);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load_or_default(Some(Path::new("/nonexistent/scrcpy-viewer.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = env::temp_dir().join(format!("scrcpy-viewer-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        fs::write(&path, "[mirror]\nclose_grace_ms = \"soon\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
