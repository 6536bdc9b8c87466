use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::SyncError;

/// Why a bounded call stopped before its future settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

impl From<Interrupted> for SyncError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::TimedOut(limit) => SyncError::Timeout(limit),
            Interrupted::Cancelled => SyncError::Cancelled,
        }
    }
}

/// Drive `fut` to completion unless `timeout` elapses or `cancel` fires first.
pub async fn bounded<F: Future>(
    fut: F,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<F::Output, Interrupted> {
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Interrupted::TimedOut(limit)),
            None => Ok(fut.await),
        }
    };

    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupted::Cancelled),
                out = timed => out,
            }
        }
        None => timed.await,
    }
}

/// [`bounded`] for calls that already return `Result<T, SyncError>`.
pub async fn settle<T, F>(
    fut: F,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    bounded(fut, timeout, cancel).await?
}
