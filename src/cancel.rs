//! Cancellation token utilities for structured async task cancellation.
//!
//! A thin layer over `tokio_util::sync::CancellationToken` plus the
//! graceful-then-forced termination used for mirroring processes.

use std::{io, process::ExitStatus, time::Duration};

use tokio::process::Child;
pub use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error type for cancelled operations.
#[derive(Debug, thiserror::Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Extension trait for `CancellationToken`.
pub trait CancellationTokenExt {
    /// Run a future with cancellation support.
    ///
    /// Returns `Err(Cancelled)` if the token is cancelled before the future completes.
    fn run<F, T>(&self, future: F) -> impl Future<Output = Result<T, Cancelled>> + Send
    where
        F: Future<Output = T> + Send,
        T: Send;

    /// Run a fallible future with cancellation support.
    fn run_result<F, T, E>(
        &self,
        future: F,
    ) -> impl Future<Output = Result<T, CancelledOr<E>>> + Send
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send;
}

impl CancellationTokenExt for CancellationToken {
    fn run<F, T>(&self, future: F) -> impl Future<Output = Result<T, Cancelled>> + Send
    where
        F: Future<Output = T> + Send,
        T: Send,
    {
        let token = self.clone();
        async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Cancelled),
                result = future => Ok(result),
            }
        }
    }

    fn run_result<F, T, E>(
        &self,
        future: F,
    ) -> impl Future<Output = Result<T, CancelledOr<E>>> + Send
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        let token = self.clone();
        async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(CancelledOr::Cancelled),
                result = future => result.map_err(CancelledOr::Error),
            }
        }
    }
}

/// Either a cancellation or the error of the cancelled operation.
#[derive(Debug)]
pub enum CancelledOr<E> {
    /// The token fired first.
    Cancelled,
    /// The operation finished with an error.
    Error(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CancelledOr<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CancelledOr<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cancelled => None,
            Self::Error(e) => Some(e),
        }
    }
}

/// Stop a child process: ask it to terminate, wait up to `grace`, then kill it.
///
/// # Errors
/// Returns an error if the process could not be waited on or killed.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    request_terminate(child).await;
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return status;
    }

    debug!("Process did not exit within {grace:?}, killing it");
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
async fn request_terminate(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let result = tokio::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {}
        Ok(_) => debug!("kill -TERM {pid} returned non-zero"),
        Err(e) => debug!("Failed to send SIGTERM to {pid}: {e}"),
    }
}

#[cfg(not(unix))]
async fn request_terminate(_child: &Child) {
    // No portable graceful signal here; the forced kill follows the grace period.
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn run_returns_cancelled_when_token_fires() {
        let token = CancellationToken::new();
        token.cancel();
        let result = token.run(std::future::pending::<()>()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_result_passes_errors_through() {
        let token = CancellationToken::new();
        let result = token
            .run_result(async { Err::<(), _>(io::Error::other("boom")) })
            .await;
        assert!(matches!(result, Err(CancelledOr::Error(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_a_sleeping_child_within_grace() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let started = Instant::now();
        let status = terminate_child(&mut child, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_kills_a_child_ignoring_sigterm() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = terminate_child(&mut child, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(!status.success());
    }
}
