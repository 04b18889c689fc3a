pub mod config;
pub mod jobs;

use anyhow::Result;
use chrono::Utc;
use dog_broker::{Broker, EnqueuedJob, MemoryStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

pub use config::AppConfig;
pub use jobs::*;

/// Broker with every job type registered against a shared context
pub struct JobCenter {
    pub broker: Arc<Broker<MemoryStore>>,
    pub context: JobContext,
}

/// Build the broker and register the four job types
pub fn build(config: &AppConfig) -> Result<JobCenter> {
    let broker = Broker::with_config(MemoryStore::new(), config.broker.clone());
    let context = JobContext::new(Arc::new(UserDirectory::seeded()), config.latency_scale);

    broker.register_job::<SendEmail>(context.clone())?;
    broker.register_job::<ProcessUser>(context.clone())?;
    broker.register_job::<ExportData>(context.clone())?;
    broker.register_job::<SendNotification>(context.clone())?;

    Ok(JobCenter {
        broker: Arc::new(broker),
        context,
    })
}

/// A mixed batch touching every queue, priority level and the delay gate
pub async fn seed_demo_jobs(broker: &Broker<MemoryStore>) -> Result<Vec<EnqueuedJob>> {
    let mut enqueued = Vec::new();

    for (to, priority) in [
        ("ada@example.com", "low"),
        ("grace@example.com", "normal"),
        ("alan@example.com", "urgent"),
    ] {
        let email = SendEmail::new(to, "Your weekly digest")
            .with_template("digest")
            .with_priority(priority);
        enqueued.push(broker.enqueue_job(&email).await?);
    }

    for action in jobs::user::USER_ACTIONS {
        enqueued.push(broker.enqueue_job(&ProcessUser::new("u-1001", action)).await?);
    }

    for format in ["pdf", "json", "csv", "xlsx"] {
        let export = ExportData::new(format, Some("u-1002".to_string()))?;
        enqueued.push(broker.enqueue_job(&export).await?);
    }

    let reminder = SendNotification::new("u-1003", "reminder", "Standup in 30 seconds", NotificationChannel::Push)?
        .with_priority("high")
        .scheduled_for(Utc::now() + chrono::Duration::seconds(30));
    enqueued.push(broker.enqueue_job(&reminder).await?);

    let alert = SendNotification::new("u-1001", "alert", "New sign-in detected", NotificationChannel::Email)?
        .with_priority("urgent");
    enqueued.push(broker.enqueue_job(&alert).await?);

    info!(count = enqueued.len(), "Seeded demo jobs");
    Ok(enqueued)
}

/// Log queue counts every `every` until the task is aborted
pub fn spawn_stats_reporter(broker: Arc<Broker<MemoryStore>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            match broker.all_stats().await {
                Ok(all) => {
                    for (queue, stats) in all {
                        info!(
                            queue = %queue,
                            waiting = stats.waiting,
                            active = stats.active,
                            delayed = stats.delayed,
                            completed = stats.completed,
                            failed = stats.failed,
                            "Queue stats"
                        );
                    }
                    let global = broker.metrics().snapshot().global;
                    info!(
                        success_rate = global.success_rate(),
                        retry_rate = global.retry_rate(),
                        "Broker metrics"
                    );
                }
                Err(e) => warn!(error = %e, "Failed to collect queue stats"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dog_broker::{JobEvent, JobPriority, JobState, QueueName};

    fn test_config() -> AppConfig {
        AppConfig {
            broker: dog_broker::BrokerConfig::default()
                .with_poll_interval(Duration::from_millis(10))
                .with_poll_jitter(Duration::ZERO),
            stats_interval: Duration::from_secs(60),
            seed_demo_jobs: false,
            latency_scale: 0.0,
        }
    }

    #[tokio::test]
    async fn test_seeded_jobs_carry_their_profiles() {
        let center = build(&test_config()).unwrap();
        let jobs = seed_demo_jobs(&center.broker).await.unwrap();
        assert_eq!(jobs.len(), 12);

        let exports: Vec<_> = jobs.iter().filter(|j| j.queue == QueueName::DataExport).collect();
        let priorities: Vec<u8> = exports.iter().map(|j| j.priority.as_u8()).collect();
        assert_eq!(priorities, vec![2, 9, 8, 6]);

        let low_email = &jobs[0];
        assert_eq!(low_email.priority, JobPriority::LOW);
        assert!(low_email.eligible_at > low_email.created_at);

        let stats = center.broker.get_stats(QueueName::Notifications).await.unwrap();
        assert_eq!(stats.waiting, 2);
    }

    #[tokio::test]
    async fn test_unknown_user_action_fails_without_retry() {
        let center = build(&test_config()).unwrap();
        let mut events = center.broker.subscribe();

        let job = center
            .broker
            .enqueue_job(&ProcessUser::new("u-1001", "launch_rocket"))
            .await
            .unwrap();
        center.broker.start().await.unwrap();

        loop {
            if let JobEvent::Failed { job_id, error, .. } = events.recv().await.unwrap() {
                assert_eq!(job_id, job.id);
                assert_eq!(error, "Unknown user action: launch_rocket");
                break;
            }
        }
        center.broker.stop().await.unwrap();

        let record = center.broker.get_job(&job.id).await.unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_export_result_is_stored() {
        let center = build(&test_config()).unwrap();
        let mut events = center.broker.subscribe();

        let job = center
            .broker
            .enqueue_job(&ExportData::new("json", None).unwrap())
            .await
            .unwrap();
        center.broker.start().await.unwrap();

        while !matches!(events.recv().await.unwrap(), JobEvent::Completed { .. }) {}
        center.broker.stop().await.unwrap();

        let record = center.broker.get_job(&job.id).await.unwrap();
        let result: ExportResult = serde_json::from_value(record.result.unwrap()).unwrap();
        assert_eq!(result.format, ExportFormat::Json);
        assert_eq!(result.record_count, 3);
    }
}
