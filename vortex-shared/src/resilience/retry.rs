//! Exponential backoff with jitter (§7: initial 1s, factor 2, jitter 20%,
//! cap 60s, bounded attempts).

use std::future::Future;
use std::time::Duration;

use crate::errors::VortexError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.20,
            cap: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the given (1-indexed) attempt, with +/- jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let base = (self.initial.as_secs_f64() * exp).min(self.cap.as_secs_f64());
        let jitter_span = base * self.jitter;
        let jittered = base + fastrand::f64() * 2.0 * jitter_span - jitter_span;
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Retry `operation` under `policy`. Permanent errors short-circuit
/// immediately (§7: `PermanentIoError` is never retried); transient errors
/// retry up to `max_attempts`, after which the last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, VortexError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VortexError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt < policy.max_attempts => {
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        let d1 = policy.delay_for_attempt(1).as_secs_f64();
        let d2 = policy.delay_for_attempt(2).as_secs_f64();
        assert!((0.8..=1.2).contains(&d1));
        assert!((1.6..=2.4).contains(&d2));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for_attempt(20).as_secs_f64();
        assert!(d <= policy.cap.as_secs_f64() * 1.2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(1),
            max_attempts: 5,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), VortexError> = retry_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VortexError::PermanentIoError("401".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_retries_until_success() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(1),
            max_attempts: 5,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<&str, VortexError> = retry_with_backoff(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VortexError::TransientIoError("timeout".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_error_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(1),
            max_attempts: 3,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), VortexError> = retry_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VortexError::TransientIoError("timeout".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
