//! Property lookup for a single device.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    DETAIL_UNKNOWN,
    bridge::Bridge,
    device::{DeviceRecord, RawDevice},
    error::FetchError,
};

const MANUFACTURER: &str = "ro.product.manufacturer";
const NAME: &str = "ro.product.name";
const MODEL: &str = "ro.product.model";
const RELEASE: &str = "ro.build.version.release";
const SDK: &str = "ro.build.version.sdk";

/// Builds [`DeviceRecord`]s from one batch property query per device.
///
/// Nothing is cached; every call goes to the bridge.
#[derive(Debug)]
pub struct DeviceInfoFetcher<B> {
    bridge: Arc<B>,
}

impl<B> Clone for DeviceInfoFetcher<B> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
        }
    }
}

impl<B: Bridge> DeviceInfoFetcher<B> {
    /// Create a fetcher querying `bridge`.
    #[must_use]
    pub const fn new(bridge: Arc<B>) -> Self {
        Self { bridge }
    }

    /// Query `device` and build its record.
    ///
    /// Properties the device does not report become [`DETAIL_UNKNOWN`].
    ///
    /// # Errors
    /// Returns [`FetchError`] if the property query itself fails.
    pub async fn fetch(&self, device: &RawDevice) -> Result<DeviceRecord, FetchError> {
        let properties = self
            .bridge
            .properties(&device.identity)
            .await
            .map_err(|source| FetchError {
                identity: device.identity.clone(),
                source,
            })?;
        debug!(
            "Fetched {} properties from {}",
            properties.len(),
            device.identity
        );
        Ok(record_from_properties(device.clone(), &properties))
    }
}

/// Merge a connection event with its queried properties.
#[must_use]
pub fn record_from_properties(
    device: RawDevice,
    properties: &HashMap<String, String>,
) -> DeviceRecord {
    let detail = |key: &str| {
        properties
            .get(key)
            .map_or_else(|| DETAIL_UNKNOWN.to_string(), |value| single_line(value))
    };
    DeviceRecord {
        manufacturer: detail(MANUFACTURER),
        name: detail(NAME),
        model: detail(MODEL),
        api: detail(RELEASE),
        sdk: detail(SDK),
        identity: device.identity,
        state: device.state,
    }
}

fn single_line(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}
