//! Abort and lifecycle coordination
//!
//! One `CancellationToken` per top-level execution. Handlers poll it at
//! checkpoints and race every external wait against it. A timeout is just a
//! task that fires the token.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::errors::{EngineError, Result};

/// Fail with `Aborted` if `signal` has fired
pub fn checkpoint(signal: &CancellationToken, at: &str) -> Result<()> {
    if signal.is_cancelled() {
        debug!(checkpoint = at, "cancellation observed");
        return Err(EngineError::aborted(format!("cancelled at {}", at)));
    }
    Ok(())
}

/// Await `fut` unless `signal` fires first
///
/// The future is dropped on abort. Work it already started outside this
/// process is not interrupted, only the wait is abandoned.
pub async fn cancellable<T, F>(signal: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    checkpoint(signal, what)?;
    tokio::select! {
        biased;
        _ = signal.cancelled() => {
            debug!(waiting_on = what, "abandoning wait on cancellation");
            Err(EngineError::aborted(format!("cancelled while waiting on {}", what)))
        }
        r = fut => r,
    }
}

/// Fire `signal` after `timeout` unless it is cancelled first
pub fn spawn_timeout(signal: CancellationToken, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = signal.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "execution timed out, aborting");
                signal.cancel();
            }
        }
    })
}
