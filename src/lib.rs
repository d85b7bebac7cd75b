//! `scrcpy-viewer` core library
//!
//! This crate keeps a live view of the Android devices attached to the local
//! debug bridge (adb) and supervises one `scrcpy` mirroring process per
//! device, collecting each process's console output into its own log.
//!
//! # Architecture
//!
//! - **[`bridge`]** - the adb client: host protocol codec, `getprop` parsing
//!   and server bootstrap, behind the [`Bridge`] trait
//! - **[`fetcher`]** - turns a raw device into a [`DeviceRecord`]
//! - **[`discovery`]** - the long-lived subscription that publishes
//!   [`DeviceSnapshot`]s
//! - **[`supervisor`]** - starts, tracks and tears down mirroring processes
//! - **[`registry`]** - the shared per-device log buffers
//! - **[`hub`]** - the facade a presentation layer holds
//!
//! Presentation (windows, terminals) is left to consumers of [`DeviceHub`].

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod hub;
pub mod registry;
pub mod supervisor;

pub use bridge::{AdbBridge, Bridge, DeviceEvents};
pub use config::Config;
pub use device::{DeviceIdentity, DeviceRecord, DeviceState, RawDevice};
pub use discovery::{DeviceDiscovery, DeviceSnapshot, DiscoveryPhase, DiscoveryStatus};
pub use error::{BridgeError, BridgeStartError, ConfigError, FetchError, LaunchError};
pub use fetcher::DeviceInfoFetcher;
pub use hub::DeviceHub;
pub use registry::{BufferId, SessionRegistry};
pub use supervisor::{MirrorSupervisor, OpenOutcome, SessionStatus};

/// Sentinel used for every device property the device did not report.
pub const DETAIL_UNKNOWN: &str = "Unknown";
