use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::QueueName;

/// Broker and worker pool configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Concurrent workers per queue unless overridden
    pub concurrency: usize,
    /// Per-queue concurrency overrides
    pub queue_concurrency: HashMap<QueueName, usize>,
    /// Idle sleep after an empty claim
    pub poll_interval: Duration,
    /// Upper bound of the random extra added to each idle sleep
    pub poll_jitter: Duration,
    /// Pause between retries of a failed store call
    pub store_retry_interval: Duration,
    /// Ceiling on exponential retry backoff; `None` leaves it uncapped
    pub max_backoff: Option<Duration>,
    /// Hard limit on one processor invocation; `None` means unbounded
    pub processor_timeout: Option<Duration>,
    /// How long `stop()` waits for in-flight jobs
    pub drain_timeout: Option<Duration>,
    /// Event broadcast buffer size
    pub event_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            queue_concurrency: HashMap::new(),
            poll_interval: Duration::from_millis(250),
            poll_jitter: Duration::from_millis(50),
            store_retry_interval: Duration::from_secs(1),
            max_backoff: None,
            processor_timeout: None,
            drain_timeout: Some(Duration::from_secs(30)),
            event_capacity: 1024,
        }
    }
}

impl BrokerConfig {
    /// Build from `QUEUE_*` environment variables, falling back to defaults
    /// for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut queue_concurrency = HashMap::new();
        for queue in QueueName::all() {
            if let Some(n) = env_parse::<usize>(&format!("QUEUE_{}_CONCURRENCY", queue.key())) {
                queue_concurrency.insert(*queue, n.max(1));
            }
        }

        Self {
            concurrency: env_parse("QUEUE_CONCURRENCY").unwrap_or(defaults.concurrency).max(1),
            queue_concurrency,
            poll_interval: env_parse("QUEUE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            poll_jitter: env_parse("QUEUE_POLL_JITTER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_jitter),
            store_retry_interval: env_parse("QUEUE_STORE_RETRY_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_retry_interval),
            max_backoff: env_parse("QUEUE_MAX_BACKOFF_SECS")
                .map(Duration::from_secs)
                .or(defaults.max_backoff),
            processor_timeout: env_parse("QUEUE_PROCESSOR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .or(defaults.processor_timeout),
            drain_timeout: env_parse("QUEUE_DRAIN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .or(defaults.drain_timeout),
            event_capacity: defaults.event_capacity,
        }
    }

    /// Set the default per-queue concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Override concurrency for one queue
    pub fn with_queue_concurrency(mut self, queue: QueueName, concurrency: usize) -> Self {
        self.queue_concurrency.insert(queue, concurrency.max(1));
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_poll_jitter(mut self, poll_jitter: Duration) -> Self {
        self.poll_jitter = poll_jitter;
        self
    }

    pub fn with_store_retry_interval(mut self, interval: Duration) -> Self {
        self.store_retry_interval = interval;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    pub fn with_processor_timeout(mut self, timeout: Duration) -> Self {
        self.processor_timeout = Some(timeout);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Effective worker count for `queue`
    pub fn concurrency_for(&self, queue: QueueName) -> usize {
        self.queue_concurrency
            .get(&queue)
            .copied()
            .unwrap_or(self.concurrency)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
