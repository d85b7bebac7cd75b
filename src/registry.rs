//! Shared per-device log buffers.
//!
//! The registry is the only state shared between the supervisor (sole
//! writer) and any number of readers. Readers receive copies, never
//! references into the live buffers.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::device::DeviceIdentity;

/// Generation tag of a log buffer. Changes every time a buffer is
/// (re)initialised, so writes meant for an old buffer cannot land in a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BufferId(u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct LogBuffer {
    id: BufferId,
    lines: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    buffers: Mutex<HashMap<DeviceIdentity, LogBuffer>>,
    next_id: AtomicU64,
    revision: watch::Sender<u64>,
}

/// Concurrency-safe map from device identity to its log lines.
///
/// Cloning is cheap and every clone sees the same buffers.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                buffers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                revision: watch::Sender::new(0),
            }),
        }
    }

    /// Start an empty buffer for `identity`, replacing any existing one.
    pub fn upsert_empty(&self, identity: DeviceIdentity) -> BufferId {
        let id = BufferId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.buffers.lock().insert(
            identity,
            LogBuffer {
                id,
                lines: Vec::new(),
            },
        );
        self.bump();
        id
    }

    /// Append one line to the buffer of `identity` if it is still generation `id`.
    ///
    /// Returns `false` when the buffer was closed or replaced in the meantime.
    pub fn append_line(
        &self,
        identity: &DeviceIdentity,
        id: BufferId,
        line: impl Into<String>,
    ) -> bool {
        let appended = {
            let mut buffers = self.inner.buffers.lock();
            match buffers.get_mut(identity) {
                Some(buffer) if buffer.id == id => {
                    buffer.lines.push(line.into());
                    true
                }
                _ => false,
            }
        };
        if appended {
            self.bump();
        }
        appended
    }

    /// Copy of every line logged for `identity`.
    #[must_use]
    pub fn snapshot(&self, identity: &DeviceIdentity) -> Option<Vec<String>> {
        self.lines_from(identity, 0)
    }

    /// Copy of the lines from index `offset` on.
    ///
    /// An offset past the end yields an empty list.
    #[must_use]
    pub fn lines_from(&self, identity: &DeviceIdentity, offset: usize) -> Option<Vec<String>> {
        self.inner
            .buffers
            .lock()
            .get(identity)
            .map(|buffer| buffer.lines.get(offset..).unwrap_or_default().to_vec())
    }

    /// Drop the buffer of `identity`. Returns whether one existed.
    pub fn remove(&self, identity: &DeviceIdentity) -> bool {
        let removed = self.inner.buffers.lock().remove(identity).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    /// Identities that currently have a buffer, sorted.
    #[must_use]
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        let mut identities: Vec<_> = self.inner.buffers.lock().keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Drop every buffer.
    pub fn clear(&self) {
        self.inner.buffers.lock().clear();
        self.bump();
    }

    /// Watch the revision counter, which increases on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn bump(&self) {
        self.inner
            .revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}
