//! Utility functions and helpers

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of running a future under a deadline and a cancellation token.
#[derive(Debug, PartialEq, Eq)]
pub enum Bounded<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

/// Run `fut` until it completes, `limit` elapses, or `cancel` fires.
///
/// Cancellation wins over completion when both are ready. Dropping the
/// future on timeout or cancellation drops whatever connection it owned.
pub async fn bounded<F, T>(fut: F, limit: Duration, cancel: &CancellationToken) -> Bounded<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(value) => Bounded::Completed(value),
            Err(_) => Bounded::TimedOut,
        },
    }
}

/// Milliseconds in a duration, saturating.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
