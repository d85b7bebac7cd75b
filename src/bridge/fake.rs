//! In-memory [`Bridge`] for tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use super::{Bridge, DeviceEventSender, DeviceEvents};
use crate::{
    device::{DeviceIdentity, RawDevice},
    error::{BridgeError, BridgeStartError},
};

#[derive(Debug)]
pub struct FakeBridge {
    start_error: Option<BridgeStartError>,
    initial: Vec<RawDevice>,
    feed: Mutex<Option<DeviceEvents>>,
    properties: HashMap<DeviceIdentity, HashMap<String, String>>,
    property_calls: AtomicUsize,
}

impl FakeBridge {
    /// A bridge whose device feed is driven through the returned sender.
    pub fn new() -> (Self, DeviceEventSender) {
        let (sender, events) = DeviceEvents::channel(4);
        let bridge = Self {
            start_error: None,
            initial: Vec::new(),
            feed: Mutex::new(Some(events)),
            properties: HashMap::new(),
            property_calls: AtomicUsize::new(0),
        };
        (bridge, sender)
    }

    pub fn failing_start(error: BridgeStartError) -> Self {
        let (mut bridge, _) = Self::new();
        bridge.start_error = Some(error);
        bridge
    }

    pub fn with_initial(mut self, devices: Vec<RawDevice>) -> Self {
        self.initial = devices;
        self
    }

    /// Register a device that answers property queries.
    pub fn with_device(mut self, serial: &str, properties: &[(&str, &str)]) -> Self {
        self.properties.insert(
            DeviceIdentity::new(serial),
            properties
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                .collect(),
        );
        self
    }

    pub fn property_calls(&self) -> usize {
        self.property_calls.load(Ordering::SeqCst)
    }
}

impl Bridge for FakeBridge {
    async fn start(&self) -> Result<(), BridgeStartError> {
        self.start_error.clone().map_or(Ok(()), Err)
    }

    async fn track_devices(&self) -> Result<DeviceEvents, BridgeError> {
        self.feed
            .lock()
            .take()
            .ok_or_else(|| BridgeError::Protocol("feed already taken".to_string()))
    }

    async fn list_devices(&self) -> Result<Vec<RawDevice>, BridgeError> {
        Ok(self.initial.clone())
    }

    async fn properties(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<HashMap<String, String>, BridgeError> {
        self.property_calls.fetch_add(1, Ordering::SeqCst);
        self.properties
            .get(identity)
            .cloned()
            .ok_or_else(|| BridgeError::Rejected {
                request: format!("host:transport:{identity}"),
                message: format!("device '{identity}' not found"),
            })
    }
}
