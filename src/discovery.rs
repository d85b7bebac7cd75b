//! Live list of connected, ready devices.
//!
//! [`DeviceDiscovery`] owns one long-lived subscription to the bridge's device
//! feed. Each batch the feed delivers is de-duplicated, filtered down to ready
//! devices, enriched through [`DeviceInfoFetcher`] and published as a new
//! [`DeviceSnapshot`] that replaces the previous one wholesale.
//!
//! The lifecycle is a small state machine, visible through [`DiscoveryPhase`]:
//!
//! ```text
//! Idle -> Starting -> Subscribed -> Stopped
//!             \
//!              -> Failed
//! ```
//!
//! A bridge that cannot be started or subscribed to is terminal: no snapshot
//! is ever published and nothing is retried.

use std::{collections::HashSet, sync::Arc};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    bridge::{Bridge, DeviceEvents},
    cancel::{CancellationToken, CancellationTokenExt, CancelledOr},
    device::{DeviceRecord, RawDevice},
    error::BridgeStartError,
    fetcher::DeviceInfoFetcher,
};

/// Where the discovery stream is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DiscoveryPhase {
    /// Not started yet.
    #[default]
    Idle,
    /// Bringing up the bridge and opening the feed.
    Starting,
    /// Receiving device batches.
    Subscribed,
    /// The bridge could not be started. Terminal.
    Failed(BridgeStartError),
    /// Cancelled, or the feed ended. Terminal.
    Stopped,
}

impl DiscoveryPhase {
    /// Whether the stream will publish nothing further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Stopped)
    }
}

/// One published view of the connected devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Publication counter, starting at 1.
    pub sequence: u64,
    /// Ready devices in batch order, one record per identity.
    pub devices: Arc<[DeviceRecord]>,
}

/// Phase plus the latest snapshot, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryStatus {
    /// Lifecycle phase.
    pub phase: DiscoveryPhase,
    /// Latest snapshot. Stays available after the stream stops.
    pub snapshot: Option<DeviceSnapshot>,
}

impl DiscoveryStatus {
    /// Devices of the latest snapshot, empty before the first one.
    #[must_use]
    pub fn devices(&self) -> Arc<[DeviceRecord]> {
        self.snapshot
            .as_ref()
            .map_or_else(|| Arc::from(Vec::new()), |snapshot| Arc::clone(&snapshot.devices))
    }
}

/// Handle to a running discovery task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct DeviceDiscovery {
    status: watch::Receiver<DiscoveryStatus>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DeviceDiscovery {
    /// Start discovery on `bridge`. The task stops when `parent` is cancelled.
    pub fn spawn<B: Bridge>(bridge: Arc<B>, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let (sender, status) = watch::channel(DiscoveryStatus::default());
        let handle = tokio::spawn(run(bridge, sender, cancel.clone()));
        Self {
            status,
            cancel,
            handle: Some(handle),
        }
    }

    /// Current phase and snapshot.
    #[must_use]
    pub fn status(&self) -> DiscoveryStatus {
        self.status.borrow().clone()
    }

    /// A receiver that observes every phase change and publication.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DiscoveryStatus> {
        self.status.clone()
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the task has ended and its final state was seen.
    pub async fn next_update(&mut self) -> Option<DiscoveryStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }

    /// Stop the task. Any snapshot being built is discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait until it has published its final phase.
    pub async fn join(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("Device discovery task failed: {err}");
            }
        }
    }
}

impl Drop for DeviceDiscovery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<B: Bridge>(
    bridge: Arc<B>,
    status: watch::Sender<DiscoveryStatus>,
    cancel: CancellationToken,
) {
    set_phase(&status, DiscoveryPhase::Starting);

    let mut events = match cancel.run_result(subscribe(bridge.as_ref())).await {
        Ok(events) => events,
        Err(CancelledOr::Cancelled) => {
            set_phase(&status, DiscoveryPhase::Stopped);
            return;
        }
        Err(CancelledOr::Error(err)) => {
            warn!("{err}");
            set_phase(&status, DiscoveryPhase::Failed(err));
            return;
        }
    };

    info!("Subscribed to device events");
    set_phase(&status, DiscoveryPhase::Subscribed);

    let fetcher = DeviceInfoFetcher::new(Arc::clone(&bridge));
    let mut sequence = 0;

    match cancel.run(bridge.list_devices()).await {
        Ok(Ok(devices)) => {
            let Ok(records) = cancel.run(collect_records(&fetcher, devices)).await else {
                set_phase(&status, DiscoveryPhase::Stopped);
                return;
            };
            sequence += 1;
            publish(&status, sequence, records);
        }
        Ok(Err(err)) => warn!("Initial device list unavailable: {err}"),
        Err(_) => {
            set_phase(&status, DiscoveryPhase::Stopped);
            return;
        }
    }

    loop {
        let batch = match cancel.run(events.recv()).await {
            Ok(Some(Ok(batch))) => batch,
            Ok(Some(Err(err))) => {
                warn!("Device event source failed: {err}");
                break;
            }
            Ok(None) => {
                info!("Device event source closed");
                break;
            }
            Err(_) => break,
        };

        let Ok(records) = cancel.run(collect_records(&fetcher, batch)).await else {
            break;
        };
        sequence += 1;
        publish(&status, sequence, records);
    }

    debug!("Device discovery stopped");
    set_phase(&status, DiscoveryPhase::Stopped);
}

async fn subscribe<B: Bridge>(bridge: &B) -> Result<DeviceEvents, BridgeStartError> {
    bridge.start().await?;
    bridge
        .track_devices()
        .await
        .map_err(|err| BridgeStartError::Subscribe {
            message: err.to_string(),
        })
}

/// De-duplicate by identity (first occurrence wins), keep ready devices and
/// fetch each one in batch order. Devices whose fetch fails are left out.
async fn collect_records<B: Bridge>(
    fetcher: &DeviceInfoFetcher<B>,
    batch: Vec<RawDevice>,
) -> Vec<DeviceRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for device in batch {
        if !seen.insert(device.identity.clone()) {
            continue;
        }
        if !device.state.is_ready() {
            debug!("Skipping {} ({})", device.identity, device.state);
            continue;
        }
        match fetcher.fetch(&device).await {
            Ok(record) => records.push(record),
            Err(err) => warn!("{err}"),
        }
    }
    records
}

fn set_phase(status: &watch::Sender<DiscoveryStatus>, phase: DiscoveryPhase) {
    status.send_modify(|status| status.phase = phase);
}

fn publish(status: &watch::Sender<DiscoveryStatus>, sequence: u64, records: Vec<DeviceRecord>) {
    debug!("Publishing snapshot {sequence} with {} device(s)", records.len());
    status.send_modify(|status| {
        status.snapshot = Some(DeviceSnapshot {
            sequence,
            devices: records.into(),
        });
    });
}
