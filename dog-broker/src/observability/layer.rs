use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

use super::LiveMetrics;
use crate::{JobEvent, JobId, JobRecord};

/// Event fan-out plus live counters
///
/// Subscribers replace "on completed" / "on failed" listeners. Sends never
/// block; a lagging subscriber loses the oldest events.
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    fn emit(&self, event: JobEvent) {
        debug!(event = event.event_name(), job_id = %event.job_id(), "Job event");
        let _ = self.event_broadcaster.send(event);
    }

    pub fn record_job_enqueued(&self, record: &JobRecord) {
        self.metrics.increment_jobs_enqueued(&record.job_type);
        self.emit(JobEvent::Enqueued {
            job_id: record.id.clone(),
            queue: record.queue,
            job_type: record.job_type.clone(),
            eligible_at: record.eligible_at,
            at: record.created_at,
        });
    }

    pub fn record_job_claimed(&self, record: &JobRecord, at: DateTime<Utc>) {
        self.metrics.increment_jobs_claimed(&record.job_type);
        self.emit(JobEvent::Claimed {
            job_id: record.id.clone(),
            queue: record.queue,
            attempt: record.attempts,
            at,
        });
    }

    pub fn record_job_completed(&self, record: &JobRecord, at: DateTime<Utc>) {
        self.metrics.increment_jobs_completed(&record.job_type);
        self.emit(JobEvent::Completed {
            job_id: record.id.clone(),
            queue: record.queue,
            at,
        });
    }

    pub fn record_job_retrying(&self, record: &JobRecord, error: &str, at: DateTime<Utc>) {
        self.metrics.increment_jobs_retried(&record.job_type);
        self.emit(JobEvent::Retrying {
            job_id: record.id.clone(),
            queue: record.queue,
            retry_at: record.eligible_at,
            error: error.to_string(),
            at,
        });
    }

    pub fn record_job_failed(&self, record: &JobRecord, error: &str, at: DateTime<Utc>) {
        self.metrics.increment_jobs_failed(&record.job_type);
        self.emit(JobEvent::Failed {
            job_id: record.id.clone(),
            queue: record.queue,
            error: error.to_string(),
            at,
        });
    }

    pub fn record_jobs_evicted(&self, record: &JobRecord, evicted: &[JobId], at: DateTime<Utc>) {
        self.metrics.increment_jobs_evicted(evicted.len() as u64);
        for job_id in evicted {
            self.emit(JobEvent::Evicted {
                job_id: job_id.clone(),
                queue: record.queue,
                at,
            });
        }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Events as a stream, skipping over lag gaps
    pub fn event_stream(&self) -> BoxStream<'static, JobEvent> {
        let stream = BroadcastStream::new(self.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobOptions, QueueName};
    use serde_json::Value;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let layer = ObservabilityLayer::default();
        let mut events = layer.subscribe();
        let record = JobRecord::new(QueueName::Email, "send", Value::Null, &JobOptions::default(), Utc::now());

        layer.record_job_enqueued(&record);
        layer.record_job_completed(&record, Utc::now());

        assert_eq!(events.recv().await.unwrap().event_name(), "enqueued");
        let completed = events.recv().await.unwrap();
        assert_eq!(completed.event_name(), "completed");
        assert_eq!(completed.job_id(), &record.id);
        assert_eq!(layer.metrics().jobs_completed(), 1);
    }

    #[tokio::test]
    async fn test_event_stream() {
        let layer = ObservabilityLayer::default();
        let mut stream = layer.event_stream();
        let record = JobRecord::new(QueueName::DataExport, "export", Value::Null, &JobOptions::default(), Utc::now());

        layer.record_job_failed(&record, "boom", Utc::now());

        match stream.next().await {
            Some(JobEvent::Failed { error, queue, .. }) => {
                assert_eq!(error, "boom");
                assert_eq!(queue, QueueName::DataExport);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
