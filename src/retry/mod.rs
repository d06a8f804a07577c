mod policy;

pub use policy::{DEFAULT_MAX_RETRY, DEFAULT_RETRY_INTERVAL, ReconnectPolicy};

use std::future::Future;

/// Metadata for one failed dial inside a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    /// 1-based attempt number within the burst.
    pub attempt: u32,
    pub of: u32,
}

/// Run one dial burst according to `policy`.
///
/// - `operation(attempt)` is called with a 1-based attempt number, with no
///   delay between attempts.
/// - `retryable(&err)` decides whether another dial in this burst can help.
/// - `on_failure(info, &err)` is called after every failed attempt.
///
/// Returns the first success, or the last error once the burst is spent or
/// an error is not retryable.
pub async fn dial_burst<T, E, Op, Fut, Retryable, OnFailure>(
    policy: &ReconnectPolicy,
    mut operation: Op,
    mut retryable: Retryable,
    mut on_failure: OnFailure,
) -> std::result::Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    Retryable: FnMut(&E) -> bool,
    OnFailure: FnMut(FailedAttempt, &E),
{
    let of = policy.attempts_per_burst();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_failure(FailedAttempt { attempt, of }, &err);
                if attempt >= of || !retryable(&err) {
                    return Err(err);
                }
                attempt += 1;
            }
        }
    }
}
