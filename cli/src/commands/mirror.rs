//! `scrcpy-viewer mirror` command implementation.

use std::{collections::HashMap, time::Duration};

use clap::Args;
use color_eyre::eyre::{Result, bail};
use console::style;
use scrcpy_viewer::{
    Config, DeviceHub, DeviceIdentity, DeviceRecord, OpenOutcome, SessionStatus,
    cancel::CancellationToken,
};
use serde::Serialize;
use tracing::warn;

use super::{first_snapshot, print_devices, start_hub};
use crate::output::Output;

const STATUS_POLL: Duration = Duration::from_millis(250);

/// Arguments for the mirror command.
#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// Serials of the devices to mirror (defaults to the only connected device)
    serials: Vec<String>,

    /// Mirror every connected device
    #[arg(short, long, conflicts_with = "serials")]
    all: bool,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum MirrorEvent<'a> {
    Opened {
        device: &'a DeviceIdentity,
        title: Option<String>,
    },
    Line {
        device: &'a DeviceIdentity,
        line: &'a str,
    },
    Status {
        device: &'a DeviceIdentity,
        status: &'a SessionStatus,
    },
}

/// Run the mirror command.
pub async fn run(
    args: MirrorArgs,
    config: &Config,
    output: Output,
    token: &CancellationToken,
) -> Result<()> {
    let mut hub = start_hub(config, token);

    let Some(status) = first_snapshot(&mut hub, token).await? else {
        hub.shutdown().await;
        return Ok(());
    };
    let devices = status.devices();

    let targets = match select_targets(&args, &devices, output) {
        Ok(targets) => targets,
        Err(err) => {
            hub.shutdown().await;
            return Err(err);
        }
    };

    for identity in &targets {
        let record = devices.iter().find(|record| &record.identity == identity);
        if record.is_none() {
            warn!("{identity} is not among the ready devices, trying anyway");
        }
        if hub.open(identity.clone()) == OpenOutcome::AlreadyActive {
            continue;
        }
        emit(output, &MirrorEvent::Opened {
            device: identity,
            title: record.map(DeviceRecord::title),
        })?;
    }

    let result = follow(&hub, &targets, output, token).await;
    hub.shutdown().await;
    result
}

fn select_targets(
    args: &MirrorArgs,
    devices: &[DeviceRecord],
    output: Output,
) -> Result<Vec<DeviceIdentity>> {
    if args.all {
        if devices.is_empty() {
            bail!("no devices ready for mirroring");
        }
        return Ok(devices.iter().map(|record| record.identity.clone()).collect());
    }

    if !args.serials.is_empty() {
        let mut targets: Vec<DeviceIdentity> = Vec::new();
        for serial in &args.serials {
            let identity = DeviceIdentity::new(serial.as_str());
            if !targets.contains(&identity) {
                targets.push(identity);
            }
        }
        return Ok(targets);
    }

    match devices {
        [] => bail!("no devices ready for mirroring"),
        [only] => Ok(vec![only.identity.clone()]),
        _ => {
            if !output.is_json() {
                print_devices(devices);
            }
            bail!("more than one device is connected; pass serials or --all")
        }
    }
}

/// Print new log lines and status changes until every session has ended or
/// the user interrupts.
async fn follow(
    hub: &DeviceHub,
    targets: &[DeviceIdentity],
    output: Output,
    token: &CancellationToken,
) -> Result<()> {
    let mut revisions = hub.registry().subscribe();
    let mut offsets: HashMap<&DeviceIdentity, usize> = HashMap::new();
    let mut reported: HashMap<&DeviceIdentity, SessionStatus> = HashMap::new();

    loop {
        revisions.borrow_and_update();
        let mut any_active = false;

        for identity in targets {
            // Read the status before the lines: a finished session has
            // appended everything before its status changed.
            let status = hub.session_status(identity);

            let offset = offsets.entry(identity).or_default();
            if let Some(lines) = hub.registry().lines_from(identity, *offset) {
                *offset += lines.len();
                for line in &lines {
                    emit(output, &MirrorEvent::Line {
                        device: identity,
                        line,
                    })?;
                }
            }

            let Some(status) = status else {
                continue;
            };
            any_active |= status.is_active();
            if reported.get(identity) != Some(&status) {
                if !matches!(status, SessionStatus::Starting) {
                    emit(output, &MirrorEvent::Status {
                        device: identity,
                        status: &status,
                    })?;
                }
                reported.insert(identity, status);
            }
        }

        if !any_active {
            return Ok(());
        }

        tokio::select! {
            () = token.cancelled() => return Ok(()),
            changed = revisions.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            () = tokio::time::sleep(STATUS_POLL) => {}
        }
    }
}

fn emit(output: Output, event: &MirrorEvent<'_>) -> Result<()> {
    output.emit(event, || print_event(event))
}

fn print_event(event: &MirrorEvent<'_>) {
    match event {
        MirrorEvent::Opened { device, title } => {
            println!(
                "{} {}",
                style("Mirroring").green().bold(),
                title.as_deref().unwrap_or(device.as_str())
            );
        }
        MirrorEvent::Line { device, line } => {
            println!("{} {line}", style(format!("[{device}]")).cyan());
        }
        MirrorEvent::Status { device, status } => match status {
            SessionStatus::Running { pid } => {
                let pid = pid.map_or_else(|| "?".to_string(), |pid| pid.to_string());
                println!("{} {device} (pid {pid})", style("Running").green().bold());
            }
            SessionStatus::Exited(Some(0)) => {
                println!("{} {device}", style("Finished").green().bold());
            }
            SessionStatus::Exited(Some(code)) => {
                println!("{} {device} exited with code {code}", style("Exited").yellow().bold());
            }
            SessionStatus::Exited(None) => {
                println!("{} {device} was terminated", style("Exited").yellow().bold());
            }
            SessionStatus::Failed(error) => {
                println!("{} {error}", style("Failed").red().bold());
            }
            SessionStatus::Starting => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use scrcpy_viewer::DeviceState;

    use super::*;

    fn record(serial: &str) -> DeviceRecord {
        DeviceRecord {
            identity: DeviceIdentity::new(serial),
            manufacturer: "Acme".to_string(),
            name: "rocket".to_string(),
            model: "R1".to_string(),
            api: "14".to_string(),
            sdk: "34".to_string(),
            state: DeviceState::Device,
        }
    }

    fn args(serials: &[&str], all: bool) -> MirrorArgs {
        MirrorArgs {
            serials: serials.iter().map(ToString::to_string).collect(),
            all,
        }
    }

    #[test]
    fn single_device_is_picked_implicitly() {
        let targets = select_targets(&args(&[], false), &[record("a")], Output::Json).unwrap();
        assert_eq!(targets, vec![DeviceIdentity::new("a")]);
    }

    #[test]
    fn several_devices_need_a_choice() {
        assert!(select_targets(&args(&[], false), &[record("a"), record("b")], Output::Json).is_err());
        assert!(select_targets(&args(&[], false), &[], Output::Json).is_err());
    }

    #[test]
    fn explicit_serials_are_deduplicated() {
        let targets = select_targets(&args(&["b", "a", "b"], false), &[record("a")], Output::Json).unwrap();
        assert_eq!(
            targets,
            vec![DeviceIdentity::new("b"), DeviceIdentity::new("a")]
        );
    }

    #[test]
    fn all_takes_every_ready_device() {
        let targets =
            select_targets(&args(&[], true), &[record("a"), record("b")], Output::Json).unwrap();
        assert_eq!(targets.len(), 2);
    }
}
