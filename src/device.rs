//! Device identities, raw connection events and enriched device records.

use std::{borrow::Borrow, fmt};

use serde::Serialize;

/// Stable handle naming one connected device: its adb serial.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap an adb serial.
    #[must_use]
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// The raw serial string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

impl From<String> for DeviceIdentity {
    fn from(serial: String) -> Self {
        Self(serial)
    }
}

impl Borrow<str> for DeviceIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Connection state reported by adb for a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Online and ready (`device`).
    Device,
    /// Known to adb but not responding.
    Offline,
    /// Waiting for the user to accept the RSA key.
    Unauthorized,
    /// Key exchange in progress.
    Authorizing,
    /// Transport is being established.
    Connecting,
    /// Sitting in the bootloader.
    Bootloader,
    /// Booted into recovery.
    Recovery,
    /// Recovery sideload mode.
    Sideload,
    /// Rescue mode.
    Rescue,
    /// The host itself.
    Host,
    /// The host lacks permissions for the USB device.
    NoPermissions,
    /// Any state this crate does not know about.
    Unknown(String),
}

impl DeviceState {
    /// Parse the state column of an adb device list.
    #[must_use]
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => Self::Device,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            "authorizing" => Self::Authorizing,
            "connecting" => Self::Connecting,
            "bootloader" => Self::Bootloader,
            "recovery" => Self::Recovery,
            "sideload" => Self::Sideload,
            "rescue" => Self::Rescue,
            "host" => Self::Host,
            other if other.starts_with("no permissions") => Self::NoPermissions,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether the device can serve property queries and mirroring.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Device)
    }

    /// The adb spelling of this state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Device => "device",
            Self::Offline => "offline",
            Self::Unauthorized => "unauthorized",
            Self::Authorizing => "authorizing",
            Self::Connecting => "connecting",
            Self::Bootloader => "bootloader",
            Self::Recovery => "recovery",
            Self::Sideload => "sideload",
            Self::Rescue => "rescue",
            Self::Host => "host",
            Self::NoPermissions => "no permissions",
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device as delivered by the event source, before enrichment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDevice {
    /// Serial of the device.
    pub identity: DeviceIdentity,
    /// Connection state.
    pub state: DeviceState,
}

impl RawDevice {
    /// Create a raw device.
    #[must_use]
    pub fn new(identity: impl Into<DeviceIdentity>, state: DeviceState) -> Self {
        Self {
            identity: identity.into(),
            state,
        }
    }
}

/// A connected device enriched with the properties shown to the user.
///
/// Built once per connection event and never patched in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// Serial of the device.
    pub identity: DeviceIdentity,
    /// `ro.product.manufacturer`
    pub manufacturer: String,
    /// `ro.product.name`
    pub name: String,
    /// `ro.product.model`
    pub model: String,
    /// `ro.build.version.release`
    pub api: String,
    /// `ro.build.version.sdk`
    pub sdk: String,
    /// Connection state at the time of the event.
    pub state: DeviceState,
}

impl DeviceRecord {
    /// `Api: <release>`
    #[must_use]
    pub fn api_label(&self) -> String {
        format!("Api: {}", self.api)
    }

    /// `Sdk: <level>`
    #[must_use]
    pub fn sdk_label(&self) -> String {
        format!("Sdk: {}", self.sdk)
    }

    /// One-line description used as the title of the device's log view.
    #[must_use]
    pub fn title(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.manufacturer,
            self.name,
            self.model,
            self.sdk_label(),
            self.api_label()
        )
    }
}
