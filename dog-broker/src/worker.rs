use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::{QueueStore, Receipt},
    clock::Clock,
    config::BrokerConfig,
    job::ProcessorRegistry,
    observability::ObservabilityLayer,
    retry::{Decision, RetryPolicy},
    JobError, JobId, JobRecord, QueueError, QueueName, QueueResult,
};

/// Everything a worker task needs, shared across the pool
pub(crate) struct WorkerShared<S: QueueStore> {
    pub store: Arc<S>,
    pub registry: Arc<RwLock<ProcessorRegistry>>,
    pub observability: ObservabilityLayer,
    pub clock: Arc<dyn Clock>,
    pub policy: RetryPolicy,
    pub config: BrokerConfig,
}

/// Polling executors, `concurrency_for(queue)` independent tasks per queue
pub struct WorkerPool<S: QueueStore> {
    shared: Arc<WorkerShared<S>>,
}

impl<S: QueueStore> WorkerPool<S> {
    pub(crate) fn new(shared: Arc<WorkerShared<S>>) -> Self {
        Self { shared }
    }

    /// Spawn the workers for `queues` and return the handle that drains them
    pub fn start(&self, queues: impl IntoIterator<Item = QueueName>) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::new();

        for queue in queues {
            let concurrency = self.shared.config.concurrency_for(queue);
            for slot in 0..concurrency {
                let worker = Worker {
                    shared: self.shared.clone(),
                    queue,
                    slot,
                    shutdown_rx: shutdown_rx.clone(),
                };
                workers.push(tokio::spawn(worker.run()));
            }
            info!(queue = %queue, concurrency, "Started workers");
        }

        WorkerHandle { shutdown_tx, workers }
    }
}

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Number of spawned worker tasks
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop claiming and wait for in-flight jobs.
    ///
    /// When `drain_timeout` elapses first the remaining workers are detached,
    /// not aborted; their jobs still settle in the store once they finish.
    pub async fn shutdown(mut self, drain_timeout: Option<Duration>) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(true);

        let drain = futures::future::join_all(self.workers.iter_mut());
        match drain_timeout {
            None => {
                drain.await;
            }
            Some(limit) => {
                if tokio::time::timeout(limit, drain).await.is_err() {
                    let remaining = self.workers.iter().filter(|w| !w.is_finished()).count();
                    warn!(remaining, "Drain timed out, detaching busy workers");
                    return Err(QueueError::DrainTimeout { remaining });
                }
            }
        }

        info!("All workers stopped");
        Ok(())
    }
}

struct Worker<S: QueueStore> {
    shared: Arc<WorkerShared<S>>,
    queue: QueueName,
    slot: usize,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: QueueStore> Worker<S> {
    /// Run the worker loop
    async fn run(mut self) {
        debug!(queue = %self.queue, slot = self.slot, "Worker started");

        // A dropped handle counts as a shutdown signal
        while !*self.shutdown_rx.borrow() && self.shutdown_rx.has_changed().is_ok() {
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    let pause = self.idle_pause();
                    self.pause(pause).await;
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Error processing job");
                    let pause = self.shared.config.store_retry_interval;
                    self.pause(pause).await;
                }
            }
        }

        debug!(queue = %self.queue, slot = self.slot, "Worker stopped");
    }

    fn idle_pause(&self) -> Duration {
        let jitter = u64::try_from(self.shared.config.poll_jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter)
        };
        self.shared.config.poll_interval.saturating_add(Duration::from_millis(extra))
    }

    /// Sleep unless shutdown is signalled first
    async fn pause(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown_rx.changed() => {}
        }
    }

    /// Claim and settle one job. `Ok(false)` means nothing was eligible.
    async fn process_next_job(&self) -> QueueResult<bool> {
        let claimed_at = self.shared.clock.now();
        let record = match self.shared.store.claim_next(self.queue, claimed_at).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        self.shared.observability.record_job_claimed(&record, claimed_at);
        self.handle(record).await?;
        Ok(true)
    }

    #[instrument(skip(self, record), fields(job_id = %record.id, job_type = %record.job_type, attempt = record.attempts))]
    async fn handle(&self, record: JobRecord) -> QueueResult<()> {
        match self.execute(&record).await {
            Ok(result) => {
                let receipt = self.ack_with_retry(&record.id, result).await?;
                let at = self.shared.clock.now();
                self.shared.observability.record_job_completed(&receipt.record, at);
                self.shared.observability.record_jobs_evicted(&receipt.record, &receipt.evicted, at);
                info!("Job completed");
            }
            Err(job_error) => {
                let decision = self.shared.policy.on_failure(&record, &job_error);
                let message = job_error.message().to_string();
                let receipt = self.fail_with_retry(&record.id, &message, decision).await?;
                let at = self.shared.clock.now();

                match decision {
                    Decision::RetryAfter(delay) => {
                        self.shared.observability.record_job_retrying(&receipt.record, &message, at);
                        warn!(error = %message, retry_in = ?delay, "Job failed, will retry");
                    }
                    Decision::GiveUp => {
                        self.shared.observability.record_job_failed(&receipt.record, &message, at);
                        self.shared.observability.record_jobs_evicted(&receipt.record, &receipt.evicted, at);
                        error!(error = %message, "Job failed permanently");
                    }
                }
            }
        }
        Ok(())
    }

    /// Invoke the processor in its own task so a panic stays a job failure
    async fn execute(&self, record: &JobRecord) -> Result<Value, JobError> {
        let processor = self
            .shared
            .registry
            .read()
            .get(record.queue, &record.job_type)
            .ok_or_else(|| {
                JobError::permanent(format!("No processor registered for job type '{}'", record.job_type))
            })?;

        let payload = record.payload.clone();
        let started = Instant::now();
        let task = tokio::spawn(async move { processor.process(payload).await });
        let abort = task.abort_handle();

        let joined = match self.shared.config.processor_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Err(JobError::retryable(format!(
                        "Processor timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => task.await,
        };

        self.shared
            .observability
            .metrics()
            .record_execution_time(&record.job_type, started.elapsed());

        match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(JobError::retryable(format!(
                "Processor panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(JobError::retryable(format!("Processor task failed: {}", e))),
        }
    }

    /// The job stays Active until the store durably records completion
    async fn ack_with_retry(&self, job_id: &JobId, result: Value) -> QueueResult<Receipt> {
        loop {
            let now = self.shared.clock.now();
            match self.shared.store.ack(job_id, Some(result.clone()), now).await {
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Ack failed, retrying");
                    tokio::time::sleep(self.shared.config.store_retry_interval).await;
                }
                other => return other,
            }
        }
    }

    async fn fail_with_retry(&self, job_id: &JobId, error: &str, decision: Decision) -> QueueResult<Receipt> {
        loop {
            let now = self.shared.clock.now();
            match self.shared.store.fail(job_id, error.to_string(), decision, now).await {
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Recording failure failed, retrying");
                    tokio::time::sleep(self.shared.config.store_retry_interval).await;
                }
                other => return other,
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::clock::SystemClock;
    use crate::types::JobState;
    use crate::JobOptions;
    use serde_json::json;
    use tracing_test::traced_test;

    async fn shared_with(registry: ProcessorRegistry, config: BrokerConfig) -> Arc<WorkerShared<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store.declare_queue(QueueName::Email).await.unwrap();
        Arc::new(WorkerShared {
            store,
            registry: Arc::new(RwLock::new(registry)),
            observability: ObservabilityLayer::default(),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::default(),
            config,
        })
    }

    async fn wait_for_state(store: &MemoryStore, id: &JobId, state: JobState) -> JobRecord {
        for _ in 0..200 {
            let record = store.get(id).await.unwrap();
            if record.state == state {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", id, state);
    }

    fn fast_config() -> BrokerConfig {
        BrokerConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_poll_jitter(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_panicking_processor_is_retried() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(
                QueueName::Email,
                "explode",
                Arc::new(|_payload: Value| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<Value, JobError>(Value::Null)
                }),
            )
            .unwrap();
        let shared = shared_with(registry, fast_config()).await;

        let options = JobOptions::default().with_max_attempts(1);
        let record = JobRecord::new(QueueName::Email, "explode", json!({}), &options, chrono::Utc::now());
        let id = shared.store.enqueue(record).await.unwrap();

        let handle = WorkerPool::new(shared.clone()).start([QueueName::Email]);
        let failed = wait_for_state(&shared.store, &id, JobState::Failed).await;
        handle.shutdown(Some(Duration::from_secs(1))).await.unwrap();

        assert_eq!(failed.last_error.as_deref(), Some("Processor panicked: kaboom"));
    }

    #[tokio::test]
    async fn test_processor_timeout() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(
                QueueName::Email,
                "slow",
                Arc::new(|_payload: Value| async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<Value, JobError>(Value::Null)
                }),
            )
            .unwrap();
        let config = fast_config().with_processor_timeout(Duration::from_millis(20));
        let shared = shared_with(registry, config).await;

        let options = JobOptions::default().with_max_attempts(1);
        let record = JobRecord::new(QueueName::Email, "slow", json!({}), &options, chrono::Utc::now());
        let id = shared.store.enqueue(record).await.unwrap();

        let handle = WorkerPool::new(shared.clone()).start([QueueName::Email]);
        let failed = wait_for_state(&shared.store, &id, JobState::Failed).await;
        handle.shutdown(Some(Duration::from_secs(1))).await.unwrap();

        assert_eq!(failed.last_error.as_deref(), Some("Processor timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_unregistered_job_type_fails_permanently() {
        let shared = shared_with(ProcessorRegistry::new(), fast_config()).await;

        let record = JobRecord::new(QueueName::Email, "ghost", json!({}), &JobOptions::default(), chrono::Utc::now());
        let id = shared.store.enqueue(record).await.unwrap();

        let handle = WorkerPool::new(shared.clone()).start([QueueName::Email]);
        let failed = wait_for_state(&shared.store, &id, JobState::Failed).await;
        handle.shutdown(None).await.unwrap();

        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_worker_count_follows_concurrency() {
        let config = fast_config().with_concurrency(3);
        let shared = shared_with(ProcessorRegistry::new(), config).await;

        let handle = WorkerPool::new(shared).start([QueueName::Email]);
        assert_eq!(handle.worker_count(), 3);
        handle.shutdown(Some(Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_retry_and_give_up_are_logged() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(
                QueueName::Email,
                "flaky",
                Arc::new(|_payload: Value| async move { Err::<Value, _>(JobError::retryable("boom")) }),
            )
            .unwrap();
        let shared = shared_with(registry, fast_config()).await;

        let options = JobOptions::default()
            .with_max_attempts(2)
            .with_base_backoff(Duration::ZERO);
        let record = JobRecord::new(QueueName::Email, "flaky", json!({}), &options, chrono::Utc::now());
        let id = shared.store.enqueue(record).await.unwrap();

        // Drive the worker inline so its logs land in this test's span
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            shared: shared.clone(),
            queue: QueueName::Email,
            slot: 0,
            shutdown_rx,
        };

        assert!(worker.process_next_job().await.unwrap());
        assert!(logs_contain("Job failed, will retry"));
        assert!(logs_contain("retry_in=0ns"));

        assert!(worker.process_next_job().await.unwrap());
        assert!(logs_contain("Job failed permanently"));

        let failed = shared.store.get(&id).await.unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempts, 2);
        assert!(!worker.process_next_job().await.unwrap());
    }
}
