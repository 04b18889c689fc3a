use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::JobPriority;
use crate::{QueueError, QueueResult};

/// Per-enqueue options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Ordering priority (higher first)
    pub priority: JobPriority,

    /// Hold the job back this long after enqueue
    #[serde(with = "millis")]
    pub delay: Duration,

    /// Attempt ceiling, including the first run
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each further failure
    #[serde(with = "millis")]
    pub base_backoff: Duration,

    /// Completed jobs retained on the queue
    pub keep_completed: usize,

    /// Failed jobs retained on the queue
    pub keep_failed: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::NORMAL,
            delay: Duration::ZERO,
            max_attempts: 3,
            base_backoff: Duration::from_millis(2000),
            keep_completed: 100,
            keep_failed: 50,
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the job priority
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the enqueue delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the maximum attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base backoff
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Set both retention limits
    pub fn with_retention(mut self, keep_completed: usize, keep_failed: usize) -> Self {
        self.keep_completed = keep_completed;
        self.keep_failed = keep_failed;
        self
    }

    /// Reject options that can never produce a valid job
    pub fn validate(&self) -> QueueResult<()> {
        self.validate_at(Utc::now())
    }

    /// Like [`validate`](Self::validate), with delays checked against `now`
    pub fn validate_at(&self, now: DateTime<Utc>) -> QueueResult<()> {
        if self.max_attempts == 0 {
            return Err(QueueError::config("max_attempts must be at least 1"));
        }
        if offset(now, self.delay).is_none() {
            return Err(QueueError::config(format!("delay out of range: {:?}", self.delay)));
        }
        if offset(now, self.base_backoff).is_none() {
            return Err(QueueError::config(format!(
                "base_backoff out of range: {:?}",
                self.base_backoff
            )));
        }
        Ok(())
    }
}

/// `now + delay`, or `None` past the last representable instant
pub(crate) fn offset(now: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
}

/// `now + delay`, saturating at the last representable instant
pub(crate) fn saturating_offset(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    offset(now, delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
