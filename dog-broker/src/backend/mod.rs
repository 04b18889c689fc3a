#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    retry::Decision,
    types::{JobId, JobRecord, JobState, QueueName, QueueStats},
    QueueResult,
};

/// Outcome of a successful `ack` or `fail`
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The record after the transition
    pub record: JobRecord,

    /// Terminal jobs dropped by retention trimming
    pub evicted: Vec<JobId>,
}

/// Durable ordered job storage, one partition per named queue.
///
/// Every mutating call is atomic with respect to concurrent claimers:
/// two `claim_next` calls never return the same job.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Connectivity check; the broker refuses to start when this fails
    async fn ping(&self) -> QueueResult<()>;

    /// Create the partition for `queue` if it does not exist yet
    async fn declare_queue(&self, queue: QueueName) -> QueueResult<()>;

    /// Persist a new waiting record. The store assigns its sequence number.
    async fn enqueue(&self, record: JobRecord) -> QueueResult<JobId>;

    /// Atomically move the best eligible job to Active and return it
    async fn claim_next(&self, queue: QueueName, now: DateTime<Utc>) -> QueueResult<Option<JobRecord>>;

    /// Active -> Completed, then trim the completed cohort
    async fn ack(&self, job_id: &JobId, result: Option<Value>, now: DateTime<Utc>) -> QueueResult<Receipt>;

    /// Active -> DelayedRetry or Failed per `decision`, then trim the failed cohort
    async fn fail(
        &self,
        job_id: &JobId,
        error: String,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> QueueResult<Receipt>;

    /// Counts per state
    async fn stats(&self, queue: QueueName) -> QueueResult<QueueStats>;

    /// Jobs in `state`, in claim order for claimable states and
    /// newest-finished first for terminal ones
    async fn list(
        &self,
        queue: QueueName,
        state: JobState,
        limit: usize,
        offset: usize,
    ) -> QueueResult<Vec<JobRecord>>;

    /// Full record lookup
    async fn get(&self, job_id: &JobId) -> QueueResult<JobRecord>;
}
