//! The debug bridge seen from the rest of the crate.
//!
//! [`Bridge`] is the seam between device discovery and the adb server.
//! [`AdbBridge`] is the real implementation; tests substitute in-memory fakes.

pub mod adb;
pub mod bootstrap;
#[cfg(test)]
pub(crate) mod fake;
pub mod props;
pub mod protocol;

use std::{collections::HashMap, fmt::Debug};

use tokio::sync::mpsc;

pub use adb::AdbBridge;

use crate::{
    device::{DeviceIdentity, RawDevice},
    error::{BridgeError, BridgeStartError},
};

/// One batch delivered by the device feed: the full list of devices adb
/// currently knows about, or the error that ended the feed.
pub type DeviceBatch = Result<Vec<RawDevice>, BridgeError>;

/// Sending half of a [`DeviceEvents`] feed.
pub type DeviceEventSender = mpsc::Sender<DeviceBatch>;

/// Operations the device-session manager needs from the debug bridge.
pub trait Bridge: Send + Sync + 'static {
    /// Make sure the bridge server is running, starting it if necessary.
    fn start(&self) -> impl Future<Output = Result<(), BridgeStartError>> + Send;

    /// Subscribe to connection changes.
    ///
    /// Every batch carries the complete device list at that moment. The feed
    /// closes when the server drops the subscription.
    fn track_devices(&self) -> impl Future<Output = Result<DeviceEvents, BridgeError>> + Send;

    /// Pull the current device list once.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<RawDevice>, BridgeError>> + Send;

    /// Query every system property of one device in a single round trip.
    fn properties(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<HashMap<String, String>, BridgeError>> + Send;
}

/// Receiving half of the push-based device feed.
pub struct DeviceEvents {
    receiver: mpsc::Receiver<DeviceBatch>,
}

impl Debug for DeviceEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEvents").finish_non_exhaustive()
    }
}

impl DeviceEvents {
    /// Create a bounded feed. Producers wait when `capacity` batches are queued.
    #[must_use]
    pub fn channel(capacity: usize) -> (DeviceEventSender, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }

    /// Next batch, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DeviceBatch> {
        self.receiver.recv().await
    }
}
