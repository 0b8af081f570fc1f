//! Retry policy helpers.

use std::time::Duration;

use rand::Rng;

use crate::error::QueryError;

/// Retry decision result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after a delay.
    RetryAfter(Duration),
    /// Do not retry.
    DoNotRetry,
}

/// Retry policy applied to every page request.
///
/// Delays grow exponentially from `min_delay`, doubling per attempt, and are
/// capped at `max_delay` before jitter is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum jitter to add to delays.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Decide whether to retry based on the error and attempt count.
    #[must_use]
    pub fn decide(&self, error: &QueryError, attempt: usize) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        let delay = self.backoff(attempt);
        let delay = match error.retry_after() {
            Some(requested) if requested > delay => requested,
            _ => delay,
        };
        RetryDecision::RetryAfter(delay)
    }

    /// Backoff delay following the given (1-based) attempt.
    #[must_use]
    pub fn backoff(&self, attempt: usize) -> Duration {
        let base_ms = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let exp =
            2_u64.saturating_pow(u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(exp).min(max_ms);
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            let jitter_max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
            rand::thread_rng().gen_range(0..=jitter_max)
        };
        Duration::from_millis(delay_ms.saturating_add(jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            max_jitter: Duration::ZERO,
        }
    }

    fn transient() -> QueryError {
        QueryError::Json("unexpected end of input".into())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(250));
        assert_eq!(policy.backoff(30), Duration::from_millis(250));
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = policy();
        assert!(matches!(
            policy.decide(&transient(), 3),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(policy.decide(&transient(), 4), RetryDecision::DoNotRetry);
    }

    #[test]
    fn never_retries_build_errors() {
        let err = QueryError::IllegalField {
            path: "nope".into(),
        };
        assert_eq!(policy().decide(&err, 1), RetryDecision::DoNotRetry);
    }

    #[test]
    fn honours_longer_retry_after() {
        let err = QueryError::HttpStatus {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            policy().decide(&err, 1),
            RetryDecision::RetryAfter(Duration::from_secs(3))
        );
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            max_jitter: Duration::from_millis(50),
            ..policy()
        };
        for _ in 0..32 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn none_makes_a_single_attempt() {
        assert_eq!(
            RetryPolicy::none().decide(&transient(), 1),
            RetryDecision::DoNotRetry
        );
    }
}
