use std::time::Duration;

use crate::{JobError, JobRecord};

/// What to do with a job after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff policy
///
/// Pure function over the claimed record; `attempts` has already been
/// incremented by the claim. The delay after the k-th failure is
/// `base_backoff * 2^(k-1)`, optionally capped at `max_backoff`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_backoff: Option<Duration>) -> Self {
        Self { max_backoff }
    }

    pub fn on_failure(&self, record: &JobRecord, error: &JobError) -> Decision {
        if !error.is_retryable() || record.attempts >= record.max_attempts {
            return Decision::GiveUp;
        }
        Decision::RetryAfter(self.backoff(record.base_backoff, record.attempts))
    }

    /// Delay before the retry that follows failure number `attempt`
    pub fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = 1u32
            .checked_shl(exponent)
            .and_then(|factor| base.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}
