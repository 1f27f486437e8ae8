//! Retrying idempotent remote calls with capped exponential backoff

use boxsig_errors::Result;
use boxsig_log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry settings for transient ledger and oracle failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Backoff after the first failure
    pub initial_backoff_ms: u64,
    /// Backoff cap
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64 << attempt.min(31);
        let raw = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(raw.min(self.max_backoff_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    call = what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxsig_errors::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(1600));
        assert_eq!(policy.backoff(4), Duration::from_millis(2000));
        assert_eq!(policy.backoff(40), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::transient("connection reset"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "down", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::CostOracleUnavailable("offline".to_string()))
        })
        .await;
        assert!(matches!(result, Err(Error::CostOracleUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "rejected", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::rejected("logic eval error"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<()> = with_retry(&RetryPolicy::none(), "once", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::transient("timeout"))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
