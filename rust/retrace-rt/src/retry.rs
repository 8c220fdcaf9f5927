//! Retry-until-success for flaky remote calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::IndexSection;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            delay: Duration::from_millis(100),
        }
    }
}

impl From<&IndexSection> for RetryPolicy {
    fn from(section: &IndexSection) -> Self {
        Self {
            attempts: section.attempts,
            delay: section.retry_delay(),
        }
    }
}

/// Calls `call` until it succeeds or `policy.attempts` are used up, sleeping
/// `policy.delay` after every failure. Returns the last error. Cancellation
/// interrupts both the call and the sleep.
pub async fn call_for_success<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = call() => result,
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(err) => err,
        };
        if attempt >= attempts {
            debug!(attempt, %err, "giving up");
            return Err(err);
        }
        debug!(attempt, %err, "retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = call_for_success(&quick(5), &CancellationToken::new(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClientError::Transport("reset".into()))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let err = call_for_success(&quick(3), &CancellationToken::new(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ClientError::Status {
                status: 500 + n as u16,
                body: String::new(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 502, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_stops_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let err = call_for_success(&quick(5), &token, || async { Ok::<_, ClientError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
