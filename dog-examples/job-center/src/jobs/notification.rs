use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dog_broker::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{default_priority_label, priority_from_label, JobContext};

/// Notification categories accepted for delivery
pub const NOTIFICATION_TYPES: [&str; 7] = [
    "welcome",
    "verification",
    "reminder",
    "alert",
    "update",
    "promotion",
    "system",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    #[default]
    InApp,
    Webhook,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::InApp => "in_app",
            Self::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

impl FromStr for NotificationChannel {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "in_app" => Ok(Self::InApp),
            "webhook" => Ok(Self::Webhook),
            _ => Err(QueueError::config(format!(
                "Invalid channel '{}'. Valid channels: email, sms, push, in_app, webhook",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub channel: NotificationChannel,
    #[serde(default = "default_priority_label")]
    pub priority: String,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

impl SendNotification {
    /// Validate the notification type before anything is enqueued
    pub fn new(
        user_id: impl Into<String>,
        kind: &str,
        message: impl Into<String>,
        channel: NotificationChannel,
    ) -> QueueResult<Self> {
        if !NOTIFICATION_TYPES.contains(&kind) {
            return Err(QueueError::config(format!(
                "Invalid type '{}'. Valid types: {}",
                kind,
                NOTIFICATION_TYPES.join(", ")
            )));
        }

        Ok(Self {
            user_id: user_id.into(),
            kind: kind.to_string(),
            message: message.into(),
            channel,
            priority: default_priority_label(),
            scheduled_for: None,
            metadata: Value::Null,
        })
    }

    pub fn with_priority(mut self, label: impl Into<String>) -> Self {
        self.priority = label.into();
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Time left until `scheduled_for`, zero when unset or already past
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        self.scheduled_for
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: NotificationChannel,
    pub user_id: String,
    pub sent_at: DateTime<Utc>,
    pub metadata: Value,
}

#[async_trait]
impl Job for SendNotification {
    type Context = JobContext;
    type Output = NotificationResult;

    const JOB_TYPE: &'static str = "send-notification";
    const QUEUE: QueueName = QueueName::Notifications;

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError> {
        ctx.simulate(1000).await;

        match self.channel {
            NotificationChannel::Email => {
                // Users without a record simply get nothing
                if let Some(user) = ctx.users.find(&self.user_id).await {
                    let subject = format!("Notification: {}", self.kind);
                    ctx.deliver_email(&user.email, &subject, Some("notification")).await?;
                }
            }
            channel => {
                info!(user_id = %self.user_id, channel = %channel, message = %self.message, "Notification delivered");
            }
        }

        Ok(NotificationResult {
            success: true,
            kind: self.kind.clone(),
            channel: self.channel,
            user_id: self.user_id.clone(),
            sent_at: Utc::now(),
            metadata: self.metadata.clone(),
        })
    }

    /// Email gets an extra attempt; SMS providers get longer to recover
    fn options(&self) -> Option<JobOptions> {
        let max_attempts = if self.channel == NotificationChannel::Email { 3 } else { 2 };
        let base_backoff = if self.channel == NotificationChannel::Sms {
            Duration::from_millis(10_000)
        } else {
            Duration::from_millis(3000)
        };

        Some(
            JobOptions::default()
                .with_priority(priority_from_label(&self.priority))
                .with_delay(self.delay_from(Utc::now()))
                .with_retention(200, 50)
                .with_max_attempts(max_attempts)
                .with_base_backoff(base_backoff),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_profiles() {
        let sms = SendNotification::new("u-1", "alert", "Server down", NotificationChannel::Sms)
            .unwrap()
            .with_priority("urgent")
            .options()
            .unwrap();
        assert_eq!(sms.max_attempts, 2);
        assert_eq!(sms.base_backoff, Duration::from_millis(10_000));
        assert_eq!(sms.priority, JobPriority::URGENT);

        let email = SendNotification::new("u-1", "welcome", "Hello", NotificationChannel::Email)
            .unwrap()
            .options()
            .unwrap();
        assert_eq!(email.max_attempts, 3);
        assert_eq!(email.base_backoff, Duration::from_millis(3000));
        assert_eq!((email.keep_completed, email.keep_failed), (200, 50));
    }

    #[test]
    fn test_scheduled_delay() {
        let now = Utc::now();
        let later = SendNotification::new("u-1", "reminder", "Standup", NotificationChannel::Push)
            .unwrap()
            .scheduled_for(now + chrono::Duration::seconds(90));
        assert_eq!(later.delay_from(now), Duration::from_secs(90));

        let past = later.clone().scheduled_for(now - chrono::Duration::seconds(5));
        assert_eq!(past.delay_from(now), Duration::ZERO);
    }

    #[test]
    fn test_invalid_type_and_channel() {
        assert!(SendNotification::new("u-1", "gossip", "psst", NotificationChannel::InApp).is_err());
        assert!("pigeon".parse::<NotificationChannel>().is_err());
        assert_eq!("in_app".parse::<NotificationChannel>().unwrap(), NotificationChannel::InApp);
    }
}
