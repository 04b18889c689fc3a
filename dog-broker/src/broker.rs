use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, instrument, warn};

use crate::{
    backend::QueueStore,
    clock::{Clock, SystemClock},
    config::BrokerConfig,
    job::{Job, Processor, ProcessorRegistry, TypedProcessor},
    observability::{LiveMetrics, ObservabilityLayer},
    retry::RetryPolicy,
    worker::{WorkerHandle, WorkerPool, WorkerShared},
    JobEvent, JobId, JobOptions, JobPriority, JobRecord, JobState, QueueName, QueueOverview,
    QueueResult, QueueError, QueueStats,
};

#[cfg(feature = "memory")]
use crate::backend::memory::MemoryStore;

/// Admission receipt returned by `enqueue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueuedJob {
    pub id: JobId,
    pub queue: QueueName,
    pub job_type: String,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    /// Earliest instant a worker may claim the job
    pub eligible_at: DateTime<Utc>,
}

/// Store reachability plus worker state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub store_reachable: bool,
    pub running: bool,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.store_reachable
    }
}

/// Job broker facade: processor registration, admission, inspection and
/// the worker lifecycle over a [`QueueStore`].
pub struct Broker<S: QueueStore> {
    store: Arc<S>,
    registry: Arc<RwLock<ProcessorRegistry>>,
    defaults: RwLock<HashMap<(QueueName, String), JobOptions>>,
    declared: RwLock<HashSet<QueueName>>,
    observability: ObservabilityLayer,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    config: BrokerConfig,
    workers: Mutex<Option<WorkerHandle>>,
    running: AtomicBool,
}

#[cfg(feature = "memory")]
impl Broker<MemoryStore> {
    /// Broker over a fresh [`MemoryStore`] with default configuration
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: QueueStore> Broker<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, BrokerConfig::default())
    }

    pub fn with_config(store: S, config: BrokerConfig) -> Self {
        Self {
            store: Arc::new(store),
            registry: Arc::new(RwLock::new(ProcessorRegistry::new())),
            defaults: RwLock::new(HashMap::new()),
            declared: RwLock::new(HashSet::new()),
            observability: ObservabilityLayer::new(config.event_capacity),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::new(config.max_backoff),
            config,
            workers: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Replace the time source; used with `ManualClock` in tests
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register the function that runs `job_type` jobs on `queue`
    pub fn register_processor(
        &self,
        queue: QueueName,
        job_type: impl Into<String>,
        processor: impl Processor,
    ) -> QueueResult<()> {
        let job_type = job_type.into();
        self.registry
            .write()
            .register(queue, job_type.clone(), Arc::new(processor))?;

        if self.is_running() {
            warn!(queue = %queue, job_type = %job_type, "Processor registered while running; new queues are picked up on the next start");
        }
        info!(queue = %queue, job_type = %job_type, "Registered processor");
        Ok(())
    }

    /// Register a typed job with the context its executions receive
    pub fn register_job<J: Job>(&self, context: J::Context) -> QueueResult<()> {
        self.register_processor(J::QUEUE, J::JOB_TYPE, TypedProcessor::<J>::new(context))
    }

    /// Options used when `enqueue` is called without explicit ones
    pub fn set_job_defaults(
        &self,
        queue: QueueName,
        job_type: impl Into<String>,
        options: JobOptions,
    ) -> QueueResult<()> {
        options.validate()?;
        self.defaults.write().insert((queue, job_type.into()), options);
        Ok(())
    }

    fn options_for(&self, queue: QueueName, job_type: &str) -> JobOptions {
        self.defaults
            .read()
            .get(&(queue, job_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    async fn declare(&self, queue: QueueName) -> QueueResult<()> {
        if self.declared.read().contains(&queue) {
            return Ok(());
        }
        self.store.declare_queue(queue).await?;
        self.declared.write().insert(queue);
        Ok(())
    }

    /// Admit a job. Returns once the store has it; processing happens later.
    #[instrument(skip(self, payload, options), fields(queue = %queue, job_type = %job_type))]
    pub async fn enqueue(
        &self,
        queue: QueueName,
        job_type: &str,
        payload: Value,
        options: Option<JobOptions>,
    ) -> QueueResult<EnqueuedJob> {
        if job_type.trim().is_empty() {
            return Err(QueueError::config("job_type must not be empty"));
        }
        let options = options.unwrap_or_else(|| self.options_for(queue, job_type));
        let now = self.clock.now();
        options.validate_at(now)?;

        let record = JobRecord::new(queue, job_type, payload, &options, now);
        self.declare(queue).await?;
        let id = self.store.enqueue(record.clone()).await?;

        self.observability.record_job_enqueued(&record);
        info!(job_id = %id, priority = %record.priority, eligible_at = %record.eligible_at, "Enqueued job");

        Ok(EnqueuedJob {
            id,
            queue,
            job_type: record.job_type,
            priority: record.priority,
            created_at: record.created_at,
            eligible_at: record.eligible_at,
        })
    }

    /// Enqueue a typed job on its own queue, with its own options when it has any
    pub async fn enqueue_job<J: Job>(&self, job: &J) -> QueueResult<EnqueuedJob> {
        let payload = serde_json::to_value(job)?;
        self.enqueue(J::QUEUE, J::JOB_TYPE, payload, job.options()).await
    }

    /// Counts per state for one queue
    pub async fn get_stats(&self, queue: QueueName) -> QueueResult<QueueStats> {
        self.declare(queue).await?;
        self.store.stats(queue).await
    }

    /// Counts for every queue
    pub async fn all_stats(&self) -> QueueResult<BTreeMap<QueueName, QueueStats>> {
        let mut all = BTreeMap::new();
        for queue in QueueName::all() {
            all.insert(*queue, self.get_stats(*queue).await?);
        }
        Ok(all)
    }

    /// Page through jobs in one state
    pub async fn list_jobs(
        &self,
        queue: QueueName,
        state: JobState,
        limit: usize,
        offset: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        self.declare(queue).await?;
        self.store.list(queue, state, limit, offset).await
    }

    pub async fn get_job(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.store.get(job_id).await
    }

    /// Counts plus the most recently finished jobs of a queue
    pub async fn overview(&self, queue: QueueName, recent_limit: usize) -> QueueResult<QueueOverview> {
        let counts = self.get_stats(queue).await?;
        let recent_completed = self.list_jobs(queue, JobState::Completed, recent_limit, 0).await?;
        let recent_failed = self.list_jobs(queue, JobState::Failed, recent_limit, 0).await?;

        Ok(QueueOverview {
            queue,
            counts,
            recent_completed,
            recent_failed,
        })
    }

    /// Store connectivity check; never fails itself
    pub async fn health(&self) -> HealthStatus {
        let ping = self.store.ping().await;
        HealthStatus {
            store_reachable: ping.is_ok(),
            running: self.is_running(),
            error: ping.err().map(|e| e.to_string()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.observability.subscribe()
    }

    pub fn event_stream(&self) -> BoxStream<'static, JobEvent> {
        self.observability.event_stream()
    }

    pub fn metrics(&self) -> &LiveMetrics {
        self.observability.metrics()
    }

    /// Verify the store and start polling every queue that has a processor.
    ///
    /// An unreachable store is fatal here rather than retried.
    #[instrument(skip(self))]
    pub async fn start(&self) -> QueueResult<()> {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return Err(QueueError::AlreadyRunning);
        }

        self.store.ping().await?;

        let queues = self.registry.read().queues();
        for queue in &queues {
            self.declare(*queue).await?;
        }
        if queues.is_empty() {
            warn!("Starting with no registered processors");
        }

        let shared = Arc::new(WorkerShared {
            store: self.store.clone(),
            registry: self.registry.clone(),
            observability: self.observability.clone(),
            clock: self.clock.clone(),
            policy: self.policy,
            config: self.config.clone(),
        });
        *workers = Some(WorkerPool::new(shared).start(queues));
        self.running.store(true, Ordering::SeqCst);

        info!("Broker started");
        Ok(())
    }

    /// Stop claiming and drain in-flight jobs, bounded by the drain timeout
    #[instrument(skip(self))]
    pub async fn stop(&self) -> QueueResult<()> {
        let handle = self.workers.lock().await.take().ok_or(QueueError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);
        handle.shutdown(self.config.drain_timeout).await?;
        info!("Broker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobError;
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_enqueue_rejects_bad_options() {
        let broker = Broker::in_memory();

        let err = broker
            .enqueue(
                QueueName::Email,
                "send",
                json!({}),
                Some(JobOptions::default().with_max_attempts(0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));

        let stats = broker.get_stats(QueueName::Email).await.unwrap();
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unrepresentable_delay() {
        let broker = Broker::in_memory();
        let options: JobOptions = serde_json::from_str(r#"{"delay": 9000000000000000}"#).unwrap();

        let err = broker
            .enqueue(QueueName::Email, "send", json!({}), Some(options))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
        assert_eq!(broker.get_stats(QueueName::Email).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_job_defaults_apply_without_explicit_options() {
        let broker = Broker::in_memory();
        broker
            .set_job_defaults(
                QueueName::DataExport,
                "export",
                JobOptions::default().with_priority(JobPriority::HIGH).with_max_attempts(2),
            )
            .unwrap();

        let job = broker
            .enqueue(QueueName::DataExport, "export", json!({"format": "csv"}), None)
            .await
            .unwrap();
        assert_eq!(job.priority, JobPriority::HIGH);
        assert_eq!(broker.get_job(&job.id).await.unwrap().max_attempts, 2);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let broker = Broker::in_memory();
        assert!(matches!(broker.stop().await, Err(QueueError::NotRunning)));

        broker.start().await.unwrap();
        assert!(broker.is_running());
        assert!(broker.health().await.running);
        assert!(matches!(broker.start().await, Err(QueueError::AlreadyRunning)));

        broker.stop().await.unwrap();
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_duplicate_processor_rejected() {
        let broker = Broker::in_memory();
        let ok = |_payload: Value| async move { Ok::<Value, JobError>(Value::Null) };

        broker.register_processor(QueueName::Email, "send", ok).unwrap();
        let err = broker.register_processor(QueueName::Email, "send", ok).unwrap_err();
        assert!(matches!(err, QueueError::ProcessorAlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn test_overview_lists_recent_terminal_jobs() {
        let config = BrokerConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_poll_jitter(Duration::ZERO);
        let broker = Broker::with_config(MemoryStore::new(), config);
        broker
            .register_processor(QueueName::Email, "send", |payload: Value| async move {
                Ok::<Value, JobError>(payload)
            })
            .unwrap();

        let mut events = broker.subscribe();
        let job = broker
            .enqueue(QueueName::Email, "send", json!({"to": "a@example.com"}), None)
            .await
            .unwrap();
        broker.start().await.unwrap();

        loop {
            if let JobEvent::Completed { job_id, .. } = events.recv().await.unwrap() {
                assert_eq!(job_id, job.id);
                break;
            }
        }
        broker.stop().await.unwrap();

        let overview = broker.overview(QueueName::Email, 10).await.unwrap();
        assert_eq!(overview.counts.completed, 1);
        assert_eq!(overview.recent_completed[0].result, Some(json!({"to": "a@example.com"})));
        assert!(overview.recent_failed.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_enqueue_is_logged() {
        let broker = Broker::in_memory();
        broker
            .enqueue(QueueName::Notifications, "push", json!({"user_id": 7}), None)
            .await
            .unwrap();

        assert!(logs_contain("Enqueued job"));
        assert!(logs_contain("push"));
    }
}
