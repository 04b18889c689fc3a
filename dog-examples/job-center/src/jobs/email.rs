use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dog_broker::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{default_priority_label, priority_from_label, JobContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmail {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default = "default_priority_label")]
    pub priority: String,
}

impl SendEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: None,
            template: None,
            priority: default_priority_label(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_priority(mut self, label: impl Into<String>) -> Self {
        self.priority = label.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub success: bool,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
    pub provider: String,
}

#[async_trait]
impl Job for SendEmail {
    type Context = JobContext;
    type Output = EmailReceipt;

    const JOB_TYPE: &'static str = "send-email";
    const QUEUE: QueueName = QueueName::Email;

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError> {
        ctx.deliver_email(&self.to, &self.subject, self.template.as_deref()).await
    }

    /// Low priority mail waits five seconds before it becomes claimable
    fn options(&self) -> Option<JobOptions> {
        let priority = priority_from_label(&self.priority);
        let delay = if priority == JobPriority::LOW {
            Duration::from_secs(5)
        } else {
            Duration::ZERO
        };

        Some(
            JobOptions::default()
                .with_priority(priority)
                .with_delay(delay)
                .with_retention(50, 25)
                .with_max_attempts(3)
                .with_base_backoff(Duration::from_millis(2000)),
        )
    }
}
