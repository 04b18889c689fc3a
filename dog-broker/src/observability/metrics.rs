use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Samples kept per job type for execution time statistics
const MAX_SAMPLES: usize = 1000;

/// Live counters for broker activity
#[derive(Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_claimed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_evicted: AtomicU64,

    job_type_metrics: RwLock<HashMap<String, JobTypeMetrics>>,
    execution_times: RwLock<HashMap<String, VecDeque<Duration>>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, job_type: &str, f: impl FnOnce(&mut JobTypeMetrics)) {
        let mut metrics = self.job_type_metrics.write();
        f(metrics.entry(job_type.to_string()).or_default());
    }

    pub fn increment_jobs_enqueued(&self, job_type: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.bump(job_type, |m| m.enqueued += 1);
    }

    pub fn increment_jobs_claimed(&self, job_type: &str) {
        self.jobs_claimed.fetch_add(1, Ordering::Relaxed);
        self.bump(job_type, |m| m.claimed += 1);
    }

    pub fn increment_jobs_completed(&self, job_type: &str) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.bump(job_type, |m| m.completed += 1);
    }

    pub fn increment_jobs_failed(&self, job_type: &str) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.bump(job_type, |m| m.failed += 1);
    }

    pub fn increment_jobs_retried(&self, job_type: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.bump(job_type, |m| m.retried += 1);
    }

    pub fn increment_jobs_evicted(&self, count: u64) {
        self.jobs_evicted.fetch_add(count, Ordering::Relaxed);
    }

    // Getters for global metrics
    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_claimed(&self) -> u64 {
        self.jobs_claimed.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn jobs_evicted(&self) -> u64 {
        self.jobs_evicted.load(Ordering::Relaxed)
    }

    /// Get metrics for a specific job type
    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.job_type_metrics.read().get(job_type).cloned()
    }

    /// Record how long one processor invocation took
    pub fn record_execution_time(&self, job_type: &str, duration: Duration) {
        let mut times = self.execution_times.write();
        let samples = times.entry(job_type.to_string()).or_default();
        samples.push_back(duration);
        if samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }

    /// Mean of the retained execution time samples
    pub fn average_execution_time(&self, job_type: &str) -> Option<Duration> {
        let times = self.execution_times.read();
        let samples = times.get(job_type).filter(|s| !s.is_empty())?;
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            global: GlobalMetrics {
                jobs_enqueued: self.jobs_enqueued(),
                jobs_claimed: self.jobs_claimed(),
                jobs_completed: self.jobs_completed(),
                jobs_failed: self.jobs_failed(),
                jobs_retried: self.jobs_retried(),
                jobs_evicted: self.jobs_evicted(),
            },
            job_types: self.job_type_metrics.read().clone(),
        }
    }
}

/// Metrics for a specific job type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub claimed: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl JobTypeMetrics {
    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.completed + self.failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.completed as f64 / total_processed as f64) * 100.0
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub global: GlobalMetrics,
    pub job_types: HashMap<String, JobTypeMetrics>,
}

/// Global broker metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMetrics {
    pub jobs_enqueued: u64,
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_evicted: u64,
}

impl GlobalMetrics {
    /// Calculate overall success rate
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.jobs_completed + self.jobs_failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.jobs_completed as f64 / total_processed as f64) * 100.0
        }
    }

    /// Calculate overall retry rate
    pub fn retry_rate(&self) -> f64 {
        if self.jobs_enqueued == 0 {
            0.0
        } else {
            (self.jobs_retried as f64 / self.jobs_enqueued as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_metrics() {
        let metrics = LiveMetrics::new();

        metrics.increment_jobs_enqueued("test_job");
        metrics.increment_jobs_completed("test_job");

        assert_eq!(metrics.jobs_enqueued(), 1);
        assert_eq!(metrics.jobs_completed(), 1);

        let job_metrics = metrics.job_type_metrics("test_job").unwrap();
        assert_eq!(job_metrics.enqueued, 1);
        assert_eq!(job_metrics.completed, 1);
        assert_eq!(job_metrics.success_rate(), 100.0);
    }

    #[test]
    fn test_average_execution_time() {
        let metrics = LiveMetrics::new();
        assert!(metrics.average_execution_time("export").is_none());

        metrics.record_execution_time("export", Duration::from_millis(100));
        metrics.record_execution_time("export", Duration::from_millis(200));
        metrics.record_execution_time("export", Duration::from_millis(300));

        assert_eq!(metrics.average_execution_time("export"), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_global_metrics() {
        let global = GlobalMetrics {
            jobs_enqueued: 100,
            jobs_claimed: 95,
            jobs_completed: 80,
            jobs_failed: 20,
            jobs_retried: 5,
            jobs_evicted: 0,
        };

        assert_eq!(global.success_rate(), 80.0);
        assert_eq!(global.retry_rate(), 5.0);
    }
}
