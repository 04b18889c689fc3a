use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::{
    backend::{QueueStore, Receipt},
    retry::Decision,
    scheduler::{OrderingKey, Scheduler},
    types::{options::saturating_offset, JobId, JobRecord, JobState, QueueName, QueueStats},
    QueueError, QueueResult,
};

type Partitions = HashMap<QueueName, Arc<Mutex<Partition>>>;

/// One named queue. Guarded by its own mutex so claims on different
/// queues never contend.
#[derive(Default)]
struct Partition {
    jobs: HashMap<JobId, JobRecord>,

    /// Waiting and DelayedRetry jobs in claim order
    ready: BTreeSet<OrderingKey>,

    /// Terminal cohorts, oldest finished at the front
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl Partition {
    fn active_record(&mut self, job_id: &JobId) -> QueueResult<&mut JobRecord> {
        let record = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if record.state != JobState::Active {
            return Err(QueueError::InvalidState {
                job_id: job_id.to_string(),
                state: record.state,
            });
        }
        Ok(record)
    }

    /// Drop the oldest members of a terminal cohort beyond `keep`
    fn trim(&mut self, state: JobState, keep: usize) -> Vec<JobId> {
        let cohort = match state {
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            _ => return Vec::new(),
        };

        let mut evicted = Vec::new();
        while cohort.len() > keep {
            if let Some(job_id) = cohort.pop_front() {
                self.jobs.remove(&job_id);
                evicted.push(job_id);
            }
        }
        evicted
    }
}

/// In-memory store for tests, development and single-process deployments
#[derive(Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<RwLock<Partitions>>,

    /// job_id -> owning queue
    index: Arc<RwLock<HashMap<JobId, QueueName>>>,

    next_seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, queue: QueueName) -> QueueResult<Arc<Mutex<Partition>>> {
        self.partitions
            .read()
            .get(&queue)
            .cloned()
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))
    }

    fn partition_of(&self, job_id: &JobId) -> QueueResult<Arc<Mutex<Partition>>> {
        let queue = self
            .index
            .read()
            .get(job_id)
            .copied()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        self.partition(queue)
    }

    fn forget(&self, evicted: &[JobId]) {
        if evicted.is_empty() {
            return;
        }
        let mut index = self.index.write();
        for job_id in evicted {
            index.remove(job_id);
        }
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn declare_queue(&self, queue: QueueName) -> QueueResult<()> {
        self.partitions.write().entry(queue).or_default();
        Ok(())
    }

    async fn enqueue(&self, mut record: JobRecord) -> QueueResult<JobId> {
        let partition = self.partition(record.queue)?;
        let job_id = record.id.clone();
        let queue = record.queue;

        {
            let mut partition = partition.lock();
            record.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            record.state = JobState::Waiting;
            partition.ready.insert(Scheduler::ordering_key(&record));
            partition.jobs.insert(job_id.clone(), record);
        }
        self.index.write().insert(job_id.clone(), queue);

        debug!(job_id = %job_id, queue = %queue, "Stored job");
        Ok(job_id)
    }

    async fn claim_next(&self, queue: QueueName, now: DateTime<Utc>) -> QueueResult<Option<JobRecord>> {
        let partition = self.partition(queue)?;
        let mut partition = partition.lock();

        let key = partition
            .ready
            .iter()
            .find(|(_, _, _, job_id)| {
                partition
                    .jobs
                    .get(job_id)
                    .is_some_and(|record| Scheduler::is_eligible(record, now))
            })
            .cloned();

        let Some(key) = key else {
            return Ok(None);
        };

        partition.ready.remove(&key);
        let job_id = &key.3;
        let record = partition
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        record.claim(now);

        debug!(job_id = %job_id, queue = %queue, attempt = record.attempts, "Claimed job");
        Ok(Some(record.clone()))
    }

    async fn ack(&self, job_id: &JobId, result: Option<Value>, now: DateTime<Utc>) -> QueueResult<Receipt> {
        let partition = self.partition_of(job_id)?;

        let receipt = {
            let mut partition = partition.lock();
            let record = partition.active_record(job_id)?;
            record.complete(result, now);
            let record = record.clone();

            partition.completed.push_back(job_id.clone());
            let evicted = partition.trim(JobState::Completed, record.keep_completed);
            Receipt { record, evicted }
        };
        self.forget(&receipt.evicted);

        Ok(receipt)
    }

    async fn fail(
        &self,
        job_id: &JobId,
        error: String,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> QueueResult<Receipt> {
        let partition = self.partition_of(job_id)?;

        let receipt = {
            let mut partition = partition.lock();
            let record = partition.active_record(job_id)?;

            match decision {
                Decision::RetryAfter(delay) => {
                    record.schedule_retry(error, saturating_offset(now, delay));
                    let record = record.clone();
                    partition.ready.insert(Scheduler::ordering_key(&record));
                    Receipt {
                        record,
                        evicted: Vec::new(),
                    }
                }
                Decision::GiveUp => {
                    record.fail(error, now);
                    let record = record.clone();
                    partition.failed.push_back(job_id.clone());
                    let evicted = partition.trim(JobState::Failed, record.keep_failed);
                    Receipt { record, evicted }
                }
            }
        };
        self.forget(&receipt.evicted);

        Ok(receipt)
    }

    async fn stats(&self, queue: QueueName) -> QueueResult<QueueStats> {
        let partition = self.partition(queue)?;
        let partition = partition.lock();

        let mut stats = QueueStats::default();
        for record in partition.jobs.values() {
            stats.record(record.state);
        }
        Ok(stats)
    }

    async fn list(
        &self,
        queue: QueueName,
        state: JobState,
        limit: usize,
        offset: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        let partition = self.partition(queue)?;
        let partition = partition.lock();

        let records: Vec<JobRecord> = match state {
            JobState::Completed | JobState::Failed => {
                let cohort = if state == JobState::Completed {
                    &partition.completed
                } else {
                    &partition.failed
                };
                cohort
                    .iter()
                    .rev()
                    .filter_map(|job_id| partition.jobs.get(job_id))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            }
            JobState::Waiting | JobState::DelayedRetry => partition
                .ready
                .iter()
                .filter_map(|key| partition.jobs.get(&key.3))
                .filter(|record| record.state == state)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            JobState::Active => {
                let mut active: Vec<&JobRecord> = partition
                    .jobs
                    .values()
                    .filter(|record| record.state == JobState::Active)
                    .collect();
                active.sort_by_key(|record| (record.processed_on, record.seq));
                active.into_iter().skip(offset).take(limit).cloned().collect()
            }
        };

        Ok(records)
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        let partition = self.partition_of(job_id)?;
        let partition = partition.lock();
        partition
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }
}
