//! Centralized retry/backoff combinator (DESIGN NOTES §9: "Retry and
//! backoff scattered across call sites... centralize into a single retry
//! combinator parameterized by `(safe_to_retry, max_tries, base_delay,
//! classifier)`"). Used by the API client (spec §4.2); the per-chunk
//! upload retry in `pipeline::upload` has different recovery semantics
//! (re-read from disk, not re-call the same closure) and is implemented
//! directly against this module's `Decision` type instead of reusing the
//! loop itself.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    /// Retry after a server-specified delay that does not count against
    /// the retry budget (spec §4.2's 503 `Retry-After` handling).
    RetryAfter(u64),
    Fatal,
}

/// Runs `op` up to `max_tries` total attempts (so `max_tries - 1`
/// retries), doubling `base_delay` between attempts, honoring
/// cooperative cancellation at each sleep point. `classify` decides
/// whether a given error is retryable; `RetryAfter` delays are not
/// subject to doubling and do not consume a try.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify>(
    max_tries: u32,
    base_delay: Duration,
    cancel: &CancellationToken,
    mut op: Op,
    classify: Classify,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> Decision,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let decision = classify(&e);
                match decision {
                    Decision::Fatal => return Err(e),
                    Decision::RetryAfter(secs) => {
                        tokio::select! {
                            _ = sleep(Duration::from_secs(secs)) => {}
                            _ = cancel.cancelled() => return Err(e),
                        }
                        continue;
                    }
                    Decision::Retry => {
                        attempt += 1;
                        if attempt >= max_tries {
                            return Err(e);
                        }
                        let delay = base_delay * 2u32.pow(attempt - 1);
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(e),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, &str> = retry_with_backoff(
            5,
            Duration::from_millis(1),
            &cancel,
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("transient") } else { Ok(42) }
            },
            |_| Decision::Retry,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_short_circuits_immediately() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, &str> = retry_with_backoff(
            5,
            Duration::from_millis(1),
            &cancel,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("fatal")
            },
            |_| Decision::Fatal,
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_budget_and_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, &str> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            &cancel,
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("still failing")
            },
            |_| Decision::Retry,
        )
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
