//! Supervision of per-device mirroring processes.
//!
//! Each open session runs in its own task, which launches
//! `<executable> <extra args> -s <serial>`, appends every output line to the
//! session's buffer in the [`SessionRegistry`] and records how the process
//! ended. Sessions are independent; closing one never waits on another.

use std::{collections::HashMap, process::Stdio, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    cancel::{CancellationToken, terminate_child},
    config::MirrorConfig,
    device::DeviceIdentity,
    error::LaunchError,
    registry::{BufferId, SessionRegistry},
};

/// Lifecycle of one mirroring process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionStatus {
    /// The process is being launched.
    Starting,
    /// The process is running.
    Running {
        /// OS process id, when the platform reports one.
        pid: Option<u32>,
    },
    /// The process ended. `None` when it was ended by a signal.
    Exited(Option<i32>),
    /// The process could not be launched.
    Failed(LaunchError),
}

impl SessionStatus {
    /// Whether the process is starting or running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running { .. })
    }
}

/// Result of [`MirrorSupervisor::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new process was launched into a fresh, empty buffer.
    Launched(BufferId),
    /// A session for this device is already starting or running.
    AlreadyActive,
}

#[derive(Debug)]
struct SessionSlot {
    buffer: BufferId,
    status: SessionStatus,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    config: MirrorConfig,
    registry: SessionRegistry,
    sessions: Mutex<HashMap<DeviceIdentity, SessionSlot>>,
    closing: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Inner {
    fn set_status(&self, identity: &DeviceIdentity, buffer: BufferId, status: SessionStatus) {
        let mut sessions = self.sessions.lock();
        if let Some(slot) = sessions.get_mut(identity) {
            if slot.buffer == buffer {
                slot.status = status;
            }
        }
    }
}

/// Starts, tracks and stops one mirroring process per device.
#[derive(Debug, Clone)]
pub struct MirrorSupervisor {
    inner: Arc<Inner>,
}

impl MirrorSupervisor {
    /// Create a supervisor writing into `registry`.
    ///
    /// Every session is stopped when `parent` is cancelled.
    #[must_use]
    pub fn new(config: MirrorConfig, registry: SessionRegistry, parent: &CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                sessions: Mutex::new(HashMap::new()),
                closing: Mutex::new(Vec::new()),
                cancel: parent.child_token(),
            }),
        }
    }

    /// The registry sessions write into.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Start mirroring `identity` unless a session is already active.
    ///
    /// A session that exited or failed to launch is replaced by a new one with
    /// an empty buffer. Launch failures are reported through
    /// [`status`](Self::status), never to the caller.
    pub fn open(&self, identity: DeviceIdentity) -> OpenOutcome {
        let mut sessions = self.inner.sessions.lock();
        if let Some(slot) = sessions.get(&identity) {
            if slot.status.is_active() {
                debug!("Session for {identity} already active");
                return OpenOutcome::AlreadyActive;
            }
            slot.cancel.cancel();
        }

        let buffer = self.inner.registry.upsert_empty(identity.clone());
        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.inner),
            identity.clone(),
            buffer,
            cancel.clone(),
        ));
        sessions.insert(
            identity,
            SessionSlot {
                buffer,
                status: SessionStatus::Starting,
                cancel,
                handle,
            },
        );
        OpenOutcome::Launched(buffer)
    }

    /// Close the session of `identity` and drop its log.
    ///
    /// Returns immediately; the process is asked to terminate and killed if it
    /// is still running after the grace period. Returns whether there was
    /// anything to close.
    pub fn close(&self, identity: &DeviceIdentity) -> bool {
        let slot = self.inner.sessions.lock().remove(identity);
        let had_log = self.inner.registry.remove(identity);
        let Some(slot) = slot else {
            return had_log;
        };

        info!("Closing mirroring session for {identity}");
        slot.cancel.cancel();
        let mut closing = self.inner.closing.lock();
        closing.retain(|handle| !handle.is_finished());
        closing.push(slot.handle);
        true
    }

    /// Status of the session of `identity`, if one exists.
    #[must_use]
    pub fn status(&self, identity: &DeviceIdentity) -> Option<SessionStatus> {
        self.inner
            .sessions
            .lock()
            .get(identity)
            .map(|slot| slot.status.clone())
    }

    /// Every session and its status, sorted by identity.
    #[must_use]
    pub fn sessions(&self) -> Vec<(DeviceIdentity, SessionStatus)> {
        let mut sessions: Vec<_> = self
            .inner
            .sessions
            .lock()
            .iter()
            .map(|(identity, slot)| (identity.clone(), slot.status.clone()))
            .collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        sessions
    }

    /// Close every session and wait, for at most twice the grace period, for
    /// their processes to go away.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self
            .inner
            .sessions
            .lock()
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        let mut handles: Vec<_> = self.inner.closing.lock().drain(..).collect();
        self.inner.registry.clear();
        for slot in slots {
            slot.cancel.cancel();
            handles.push(slot.handle);
        }

        let deadline = Instant::now() + self.inner.config.close_grace() * 2;
        for handle in handles {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!("Mirroring session did not stop in time");
            }
        }
    }
}

async fn run_session(
    inner: Arc<Inner>,
    identity: DeviceIdentity,
    buffer: BufferId,
    cancel: CancellationToken,
) {
    let config = &inner.config;
    let mut command = Command::new(&config.executable);
    command
        .args(&config.extra_args)
        .arg("-s")
        .arg(identity.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(if config.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let error = LaunchError {
                identity: identity.clone(),
                program: config.executable.clone(),
                reason: err.to_string(),
            };
            warn!("{error}");
            inner.set_status(&identity, buffer, SessionStatus::Failed(error));
            return;
        }
    };

    let pid = child.id();
    info!(
        "Mirroring {identity} (pid {})",
        pid.map_or_else(|| "?".to_string(), |pid| pid.to_string())
    );
    inner.set_status(&identity, buffer, SessionStatus::Running { pid });

    let exit = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        status = drain_and_wait(&mut child, &inner.registry, &identity, buffer, config.close_grace()) => {
            Some(status)
        }
    };

    match exit {
        Some(Ok(status)) => {
            info!("Mirroring process for {identity} exited with {status}");
            inner.set_status(&identity, buffer, SessionStatus::Exited(status.code()));
        }
        Some(Err(err)) => {
            warn!("Lost track of mirroring process for {identity}: {err}");
            inner.set_status(&identity, buffer, SessionStatus::Exited(None));
        }
        None => match terminate_child(&mut child, config.close_grace()).await {
            Ok(status) => debug!("Mirroring process for {identity} stopped with {status}"),
            Err(err) => warn!("Failed to stop mirroring process for {identity}: {err}"),
        },
    }
}

/// Pump both pipes while waiting for the process to exit.
///
/// Descendants may keep the pipes open after the process itself is gone, so
/// once it has exited the remaining output is read for at most `linger`.
async fn drain_and_wait(
    child: &mut Child,
    registry: &SessionRegistry,
    identity: &DeviceIdentity,
    buffer: BufferId,
    linger: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let output = async {
        tokio::join!(
            pump(stdout, registry, identity, buffer),
            pump(stderr, registry, identity, buffer),
        );
    };
    tokio::pin!(output);

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = &mut output => None,
    };
    let Some(status) = exited else {
        return child.wait().await;
    };

    if tokio::time::timeout(linger, output).await.is_err() {
        debug!("Output of {identity} still open after exit, no longer reading it");
    }
    status
}

async fn pump<R>(
    reader: Option<R>,
    registry: &SessionRegistry,
    identity: &DeviceIdentity,
    buffer: BufferId,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if !registry.append_line(identity, buffer, line) {
                    debug!("Discarding output for closed session {identity}");
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("Stopped reading output of {identity}: {err}");
                break;
            }
        }
    }
}
