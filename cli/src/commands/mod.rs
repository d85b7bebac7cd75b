pub mod devices;
pub mod mirror;

use std::sync::Arc;

use color_eyre::eyre::{Result, eyre};
use console::style;
use scrcpy_viewer::{
    AdbBridge, Config, DeviceHub, DeviceRecord, DiscoveryPhase, DiscoveryStatus,
    cancel::CancellationToken,
};

/// Start a hub backed by the local adb server.
pub fn start_hub(config: &Config, token: &CancellationToken) -> DeviceHub {
    DeviceHub::start(Arc::new(AdbBridge::new(config)), config, token)
}

/// Wait for the first device snapshot.
///
/// Returns `None` if the user cancelled first.
pub async fn first_snapshot(
    hub: &mut DeviceHub,
    token: &CancellationToken,
) -> Result<Option<DiscoveryStatus>> {
    let mut status = hub.status();
    loop {
        if status.snapshot.is_some() {
            return Ok(Some(status));
        }
        if status.phase.is_terminal() {
            return Err(discovery_ended(status.phase));
        }

        status = tokio::select! {
            () = token.cancelled() => return Ok(None),
            next = hub.next_update() => match next {
                Some(next) => next,
                None => {
                    let status = hub.status();
                    if status.snapshot.is_some() {
                        return Ok(Some(status));
                    }
                    return Err(discovery_ended(status.phase));
                }
            },
        };
    }
}

fn discovery_ended(phase: DiscoveryPhase) -> color_eyre::eyre::Report {
    match phase {
        DiscoveryPhase::Failed(err) => err.into(),
        _ => eyre!("device discovery stopped before listing any device"),
    }
}

/// Print a numbered device list.
pub fn print_devices(devices: &[DeviceRecord]) {
    if devices.is_empty() {
        println!("  No devices ready for mirroring");
        return;
    }
    for (index, device) in devices.iter().enumerate() {
        println!(
            "  {} {} {}",
            style(format!("[{index}]")).dim(),
            style(&device.identity).green().bold(),
            device.title()
        );
    }
}
