use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::options::{millis, saturating_offset};
use super::{JobId, JobOptions, JobPriority, QueueName};

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued and waiting to be claimed (initial)
    Waiting,

    /// Claimed by a worker
    Active,

    /// Finished successfully (terminal)
    Completed,

    /// Gave up after the last attempt or a permanent error (terminal)
    Failed,

    /// Failed an attempt and waiting out its backoff
    DelayedRetry,
}

impl JobState {
    /// Check if the state is terminal (completed or failed)
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States `claim_next` may pick from, subject to the eligibility gate
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Waiting | Self::DelayedRetry)
    }

    /// Get the state name as a string
    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DelayedRetry => "delayed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The unit of work and its metadata
///
/// Records are only ever mutated by a store while it holds the queue lock;
/// the transition methods are crate-private for that reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: QueueName,
    pub job_type: String,
    pub payload: Value,
    pub priority: JobPriority,

    /// Not claimable before this instant
    pub eligible_at: DateTime<Utc>,

    pub state: JobState,

    /// Execution attempts so far, incremented on each claim
    pub attempts: u32,
    pub max_attempts: u32,

    #[serde(with = "millis")]
    pub base_backoff: Duration,
    pub keep_completed: usize,
    pub keep_failed: usize,

    /// Last failure message, kept after later attempts for audit
    pub last_error: Option<String>,
    pub result: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub processed_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,

    /// Store-assigned enqueue sequence, FIFO tie-break after `created_at`
    pub seq: u64,
}

impl JobRecord {
    /// Create a waiting record from validated options
    pub fn new(
        queue: QueueName,
        job_type: impl Into<String>,
        payload: Value,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            queue,
            job_type: job_type.into(),
            payload,
            priority: options.priority,
            eligible_at: saturating_offset(now, options.delay),
            state: JobState::Waiting,
            attempts: 0,
            max_attempts: options.max_attempts,
            base_backoff: options.base_backoff,
            keep_completed: options.keep_completed,
            keep_failed: options.keep_failed,
            last_error: None,
            result: None,
            created_at: now,
            processed_on: None,
            finished_on: None,
            seq: 0,
        }
    }

    /// Claimable state and past the delay gate
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state.is_claimable() && self.eligible_at <= now
    }

    /// Attempts left before the job gives up
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub(crate) fn claim(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts += 1;
        self.processed_on = Some(now);
    }

    pub(crate) fn complete(&mut self, result: Option<Value>, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.result = result;
        self.finished_on = Some(now);
    }

    pub(crate) fn fail(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.finished_on = Some(now);
    }

    pub(crate) fn schedule_retry(&mut self, error: String, retry_at: DateTime<Utc>) {
        self.state = JobState::DelayedRetry;
        self.last_error = Some(error);
        self.eligible_at = self.eligible_at.max(retry_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(now: DateTime<Utc>) -> JobRecord {
        JobRecord::new(QueueName::Email, "send", json!({"to": "a@b.c"}), &JobOptions::default(), now)
    }

    #[test]
    fn test_new_record_is_waiting_and_eligible() {
        let now = Utc::now();
        let r = record(now);
        assert_eq!(r.state, JobState::Waiting);
        assert_eq!(r.attempts, 0);
        assert!(r.is_eligible(now));
    }

    #[test]
    fn test_delay_gates_eligibility() {
        let now = Utc::now();
        let opts = JobOptions::default().with_delay(Duration::from_secs(5));
        let r = JobRecord::new(QueueName::Email, "send", Value::Null, &opts, now);
        assert!(!r.is_eligible(now));
        assert!(r.is_eligible(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_retry_never_moves_eligible_at_backwards() {
        let now = Utc::now();
        let mut r = record(now);
        r.claim(now);
        r.schedule_retry("boom".into(), now + chrono::Duration::seconds(10));
        let first = r.eligible_at;
        r.claim(first);
        r.schedule_retry("boom".into(), now);
        assert_eq!(r.eligible_at, first);
        assert_eq!(r.state, JobState::DelayedRetry);
        assert_eq!(r.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::DelayedRetry.is_terminal());
        assert!(JobState::DelayedRetry.is_claimable());
        assert!(!JobState::Active.is_claimable());
    }
}
