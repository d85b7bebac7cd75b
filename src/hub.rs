//! The facade a presentation layer holds.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::{
    bridge::Bridge,
    cancel::CancellationToken,
    config::Config,
    device::{DeviceIdentity, DeviceRecord},
    discovery::{DeviceDiscovery, DiscoveryStatus},
    registry::SessionRegistry,
    supervisor::{MirrorSupervisor, OpenOutcome, SessionStatus},
};

/// Owns one discovery stream, one supervisor and the registry they share.
///
/// Selections are plain indices into the current snapshot; [`resolve`](Self::resolve)
/// maps them back to identities so that nothing outside the hub holds on to
/// device records.
#[derive(Debug)]
pub struct DeviceHub {
    discovery: DeviceDiscovery,
    supervisor: MirrorSupervisor,
    cancel: CancellationToken,
}

impl DeviceHub {
    /// Start discovery on `bridge` and set up an idle supervisor.
    ///
    /// Everything stops when `parent` is cancelled or on [`shutdown`](Self::shutdown).
    pub fn start<B: Bridge>(bridge: Arc<B>, config: &Config, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let registry = SessionRegistry::new();
        Self {
            discovery: DeviceDiscovery::spawn(bridge, &cancel),
            supervisor: MirrorSupervisor::new(config.mirror.clone(), registry, &cancel),
            cancel,
        }
    }

    /// Discovery phase and latest snapshot.
    #[must_use]
    pub fn status(&self) -> DiscoveryStatus {
        self.discovery.status()
    }

    /// Devices of the latest snapshot.
    #[must_use]
    pub fn devices(&self) -> Arc<[DeviceRecord]> {
        self.discovery.status().devices()
    }

    /// Wait for the next discovery change; `None` once discovery has ended.
    pub async fn next_update(&mut self) -> Option<DiscoveryStatus> {
        self.discovery.next_update().await
    }

    /// Independent receiver of discovery changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DiscoveryStatus> {
        self.discovery.subscribe()
    }

    /// Identity of the device at `index` in the current snapshot.
    #[must_use]
    pub fn resolve(&self, index: usize) -> Option<DeviceIdentity> {
        self.devices()
            .get(index)
            .map(|record| record.identity.clone())
    }

    /// See [`MirrorSupervisor::open`].
    pub fn open(&self, identity: DeviceIdentity) -> OpenOutcome {
        self.supervisor.open(identity)
    }

    /// Open the device at `index`, or `None` if the index is out of range.
    pub fn open_selected(&self, index: usize) -> Option<OpenOutcome> {
        self.resolve(index).map(|identity| self.open(identity))
    }

    /// See [`MirrorSupervisor::close`].
    pub fn close(&self, identity: &DeviceIdentity) -> bool {
        self.supervisor.close(identity)
    }

    /// Status of the session of `identity`.
    #[must_use]
    pub fn session_status(&self, identity: &DeviceIdentity) -> Option<SessionStatus> {
        self.supervisor.status(identity)
    }

    /// Every session and its status.
    #[must_use]
    pub fn sessions(&self) -> Vec<(DeviceIdentity, SessionStatus)> {
        self.supervisor.sessions()
    }

    /// Copy of the log of `identity`.
    #[must_use]
    pub fn log(&self, identity: &DeviceIdentity) -> Option<Vec<String>> {
        self.supervisor.registry().snapshot(identity)
    }

    /// The shared log registry, for readers.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        self.supervisor.registry()
    }

    /// Stop discovery, then close every session.
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        self.discovery.join().await;
        self.supervisor.shutdown().await;
        self.cancel.cancel();
    }
}

impl Drop for DeviceHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        bridge::fake::FakeBridge,
        device::{DeviceState, RawDevice},
        discovery::DiscoveryPhase,
    };

    async fn wait_for_devices(hub: &mut DeviceHub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.status().snapshot.map(|s| s.devices.len()) != Some(count) {
                if hub.next_update().await.is_none() {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    fn two_device_hub(config: &Config) -> (DeviceHub, crate::bridge::DeviceEventSender) {
        let (bridge, feed) = FakeBridge::new();
        let bridge = bridge
            .with_initial(vec![
                RawDevice::new("first", DeviceState::Device),
                RawDevice::new("second", DeviceState::Device),
            ])
            .with_device("first", &[("ro.product.model", "One")])
            .with_device("second", &[("ro.product.model", "Two")]);
        let hub = DeviceHub::start(Arc::new(bridge), config, &CancellationToken::new());
        (hub, feed)
    }

    #[tokio::test]
    async fn resolves_selection_against_current_snapshot() {
        let (mut hub, _feed) = two_device_hub(&Config::default());
        wait_for_devices(&mut hub, 2).await;

        assert_eq!(hub.resolve(0), Some(DeviceIdentity::new("first")));
        assert_eq!(hub.resolve(1), Some(DeviceIdentity::new("second")));
        assert_eq!(hub.resolve(2), None);
        assert_eq!(hub.open_selected(7), None);
    }

    #[tokio::test]
    async fn selection_follows_snapshot_replacement() {
        let (mut hub, feed) = two_device_hub(&Config::default());
        wait_for_devices(&mut hub, 2).await;

        feed.send(Ok(vec![RawDevice::new("second", DeviceState::Device)]))
            .await
            .unwrap();
        wait_for_devices(&mut hub, 1).await;

        assert_eq!(hub.resolve(0), Some(DeviceIdentity::new("second")));
        assert_eq!(hub.resolve(1), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn opens_selected_device_and_keeps_log_after_disconnect() {
        let mut config = Config::default();
        config.mirror.executable = "sh".to_string();
        config.mirror.extra_args = vec![
            "-c".to_string(),
            r#"echo "mirroring $2""#.to_string(),
            "mirror".to_string(),
        ];
        let (mut hub, feed) = two_device_hub(&config);
        wait_for_devices(&mut hub, 2).await;

        assert!(matches!(hub.open_selected(1), Some(OpenOutcome::Launched(_))));
        let second = DeviceIdentity::new("second");
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.session_status(&second).is_some_and(|s| s.is_active()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        feed.send(Ok(Vec::new())).await.unwrap();
        wait_for_devices(&mut hub, 0).await;

        assert_eq!(hub.log(&second), Some(vec!["mirroring second".to_string()]));
        assert!(hub.close(&second));
        assert_eq!(hub.log(&second), None);
    }

    #[tokio::test]
    async fn shutdown_stops_discovery() {
        let (mut hub, _feed) = two_device_hub(&Config::default());
        wait_for_devices(&mut hub, 2).await;

        tokio::time::timeout(Duration::from_secs(5), hub.shutdown())
            .await
            .unwrap();

        assert_eq!(hub.status().phase, DiscoveryPhase::Stopped);
        assert!(hub.sessions().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_the_hub_stops_its_sessions() {
        let mut config = Config::default();
        config.mirror.executable = "sh".to_string();
        config.mirror.extra_args = vec![
            "-c".to_string(),
            "echo ready; exec sleep 30".to_string(),
            "mirror".to_string(),
        ];
        config.mirror.close_grace_ms = 200;
        let (mut hub, _feed) = two_device_hub(&config);
        wait_for_devices(&mut hub, 2).await;

        let first = DeviceIdentity::new("first");
        hub.open(first.clone());
        let pid = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(SessionStatus::Running { pid: Some(pid) }) = hub.session_status(&first) {
                    return pid;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        drop(hub);

        tokio::time::timeout(Duration::from_secs(3), async {
            while process_alive(pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("mirroring process outlived its hub");
    }

    #[cfg(unix)]
    fn process_alive(pid: u32) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}
