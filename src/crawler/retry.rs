//! Retry policy with exponential backoff for transient fetch failures

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::JobConfig;
use crate::state::FailReason;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter never exceeds this, nor a quarter of the base delay
const MAX_JITTER: Duration = Duration::from_millis(500);

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { delay: Duration, attempt: u32 },
    /// Give up; the failure is final
    GiveUp,
}

/// Attempts and backoff for one node
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// One initial attempt plus the configured number of retries
    pub fn from_config(job: &JobConfig) -> Self {
        Self::new(
            job.retries.saturating_add(1),
            Duration::from_millis(job.retry_backoff),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed by another
    pub fn should_retry(&self, reason: &FailReason, attempt: u32) -> RetryDecision {
        if !reason.is_transient() {
            return RetryDecision::GiveUp;
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::GiveUp;
        }

        let delay = self.delay_for(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff after attempt number `attempt`: base * multiplier^(attempt-1), capped, plus jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = attempt.saturating_sub(1) as f64;
        let delay_ms = base_ms * self.backoff_multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let bound = MAX_JITTER.min(self.base_delay / 4).as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
    }
}
