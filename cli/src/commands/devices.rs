//! `scrcpy-viewer devices` command implementation.

use clap::Args;
use color_eyre::eyre::Result;
use console::style;
use scrcpy_viewer::{Config, DeviceRecord, DeviceSnapshot, cancel::CancellationToken};
use serde::Serialize;

use super::{first_snapshot, print_devices, start_hub};
use crate::output::Output;

/// Arguments for the devices command.
#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Keep running and print every change until interrupted
    #[arg(short, long)]
    watch: bool,
}

#[derive(Serialize)]
struct SnapshotPayload<'a> {
    sequence: u64,
    devices: &'a [DeviceRecord],
}

/// Run the devices command.
pub async fn run(
    args: DevicesArgs,
    config: &Config,
    output: Output,
    token: &CancellationToken,
) -> Result<()> {
    let mut hub = start_hub(config, token);

    let Some(status) = first_snapshot(&mut hub, token).await? else {
        hub.shutdown().await;
        return Ok(());
    };
    let mut last = status.snapshot;
    if let Some(snapshot) = &last {
        report(output, snapshot)?;
    }

    if args.watch {
        loop {
            let next = tokio::select! {
                () = token.cancelled() => break,
                next = hub.next_update() => next,
            };
            let Some(status) = next else {
                break;
            };
            if status.snapshot != last {
                if let Some(snapshot) = &status.snapshot {
                    report(output, snapshot)?;
                }
                last = status.snapshot;
            }
            if status.phase.is_terminal() {
                break;
            }
        }
    }

    hub.shutdown().await;
    Ok(())
}

fn report(output: Output, snapshot: &DeviceSnapshot) -> Result<()> {
    let payload = SnapshotPayload {
        sequence: snapshot.sequence,
        devices: &snapshot.devices,
    };
    output.emit(&payload, || {
        println!(
            "{} {}",
            style("Devices").green().bold(),
            style(format!("(update {})", snapshot.sequence)).dim()
        );
        print_devices(&snapshot.devices);
    })
}
