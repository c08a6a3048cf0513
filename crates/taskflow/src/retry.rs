//! Retry policy: exponential backoff with jitter, plus the retryability
//! oracle used to classify a [`crate::task::TaskError::Failed`].

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closure consulted once per failed attempt to decide whether it should be
/// retried. Supplied externally (the engine has no opinion on what is
/// transient for a given task).
pub type RetryableClassifier =
    Arc<dyn Fn(&(dyn StdError + Send + Sync)) -> bool + Send + Sync>;

/// Default classifier: everything is retryable unless told otherwise.
pub fn retryable_by_default() -> RetryableClassifier {
    Arc::new(|_err| true)
}

/// Exponential backoff with jitter, cap, and a maximum attempt count.
///
/// # Example
///
/// ```
/// use taskflow::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_backoff(Duration::from_secs(1))
///     .with_max_backoff(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts after the first (i.e. retries, not counting
    /// the initial attempt).
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_backoff: Duration,
    /// Ceiling on the backoff delay.
    #[serde(with = "duration_millis")]
    pub max_backoff: Duration,
    /// Exponential backoff multiplier.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// The engine's default: 24 retries, 2s initial, 30s cap, 2x factor.
    pub fn exponential() -> Self {
        Self {
            max_attempts: 24,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }

    /// A policy that never retries: exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial backoff delay.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the backoff ceiling.
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the exponential backoff multiplier.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Are there attempts left after `retry_count` retries already spent?
    pub fn has_attempts_remaining(&self, retry_count: u32) -> bool {
        retry_count < self.max_attempts
    }

    /// Backoff duration before the attempt numbered `attempt` (1-based,
    /// where attempt 1 is the first retry after the initial try).
    ///
    /// `min(initial * factor^(attempt-1), cap)`, jittered by a uniform
    /// factor drawn from `[0.9, 1.1]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64()
            * self.backoff_factor.powi(attempt as i32 - 1);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}

/// Serde support for Duration as milliseconds, matching the teacher's
/// `duration_millis` helper used throughout its config structs.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_defaults() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.max_attempts, 24);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
        assert_eq!(policy.backoff_factor, 2.0);
    }

    #[test]
    fn no_retry_has_no_attempts_remaining() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.has_attempts_remaining(0));
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_band() {
        let policy = RetryPolicy::exponential().with_max_backoff(Duration::from_secs(3600));

        let d1 = policy.delay_for_attempt(1).as_secs_f64();
        let d2 = policy.delay_for_attempt(2).as_secs_f64();
        let d3 = policy.delay_for_attempt(3).as_secs_f64();

        // ~2s, ~4s, ~8s within a +/-10% jitter band.
        assert!((1.8..=2.2).contains(&d1), "d1={d1}");
        assert!((3.6..=4.4).contains(&d2), "d2={d2}");
        assert!((7.2..=8.8).contains(&d3), "d3={d3}");
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::exponential().with_max_backoff(Duration::from_millis(5));
        let delay = policy.delay_for_attempt(20).as_secs_f64();
        assert!(delay <= 0.0055, "delay={delay}");
    }

    #[test]
    fn has_attempts_remaining_tracks_max() {
        let policy = RetryPolicy::exponential().with_max_attempts(2);
        assert!(policy.has_attempts_remaining(0));
        assert!(policy.has_attempts_remaining(1));
        assert!(!policy.has_attempts_remaining(2));
    }

    #[test]
    fn serialization_round_trips() {
        let policy = RetryPolicy::exponential().with_max_attempts(10);
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }

    #[test]
    fn default_classifier_retries_everything() {
        let classifier = retryable_by_default();
        let err = std::io::Error::other("x");
        assert!(classifier(&err));
    }
}
