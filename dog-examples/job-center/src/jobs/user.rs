use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dog_broker::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::JobContext;

/// Actions a user job may carry
pub const USER_ACTIONS: [&str; 3] = ["welcome_email", "profile_verification", "account_cleanup"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessUser {
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub metadata: Value,
    /// Hold the job back this long after enqueue
    #[serde(default)]
    pub delay_ms: u64,
}

impl ProcessUser {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            metadata: Value::Null,
            delay_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserJobResult {
    pub success: bool,
    pub action: String,
    pub user_id: String,
    pub processed_at: DateTime<Utc>,
    pub metadata: Value,
}

#[async_trait]
impl Job for ProcessUser {
    type Context = JobContext;
    type Output = UserJobResult;

    const JOB_TYPE: &'static str = "process-user";
    const QUEUE: QueueName = QueueName::UserProcessing;

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError> {
        match self.action.as_str() {
            "welcome_email" => {
                let user = ctx
                    .users
                    .find(&self.user_id)
                    .await
                    .ok_or_else(|| JobError::permanent(format!("User not found: {}", self.user_id)))?;

                ctx.deliver_email(&user.email, "Welcome to Our Platform!", Some("welcome"))
                    .await?;
            }
            "profile_verification" => {
                ctx.simulate(3000).await;
                if !ctx.users.mark_verified(&self.user_id, Utc::now()).await {
                    return Err(JobError::permanent(format!("User not found: {}", self.user_id)));
                }
            }
            "account_cleanup" => {
                ctx.simulate(1500).await;
            }
            other => {
                return Err(JobError::permanent(format!("Unknown user action: {}", other)));
            }
        }

        info!(action = %self.action, user_id = %self.user_id, "User job completed");

        Ok(UserJobResult {
            success: true,
            action: self.action.clone(),
            user_id: self.user_id.clone(),
            processed_at: Utc::now(),
            metadata: self.metadata.clone(),
        })
    }

    fn options(&self) -> Option<JobOptions> {
        Some(
            JobOptions::default()
                .with_delay(Duration::from_millis(self.delay_ms))
                .with_retention(100, 50)
                .with_max_attempts(3)
                .with_base_backoff(Duration::from_millis(3000)),
        )
    }
}
