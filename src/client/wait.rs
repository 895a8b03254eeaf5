//! Bounded waits

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{Error, Result};

/// Run `work` for at most `timeout`.
///
/// `work` receives a token that is cancelled when the deadline passes or
/// `stop` fires; the work future itself is dropped at that point. Returns
/// [`Error::Timeout`] or [`Error::Cancelled`] accordingly.
pub async fn deadline<F, Fut, T>(timeout: Duration, stop: &CancellationToken, work: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let token = stop.child_token();
    let work = work(token.clone());

    tokio::select! {
        result = work => result,
        _ = tokio::time::sleep(timeout) => {
            token.cancel();
            debug!("Deadline of {:?} reached", timeout);
            Err(Error::Timeout)
        }
        _ = stop.cancelled() => {
            token.cancel();
            Err(Error::Cancelled)
        }
    }
}

/// Sleep for `interval` unless `token` fires first
pub(crate) async fn pause(interval: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(interval) => Ok(()),
        _ = token.cancelled() => Err(Error::Cancelled),
    }
}
