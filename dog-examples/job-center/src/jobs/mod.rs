pub mod email;
pub mod export;
pub mod notification;
pub mod user;

pub use email::{EmailReceipt, SendEmail};
pub use export::{ExportData, ExportFormat, ExportResult};
pub use notification::{NotificationChannel, NotificationResult, SendNotification};
pub use user::{ProcessUser, UserJobResult};

use chrono::{DateTime, Utc};
use dog_broker::{JobError, JobPriority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// In-process user records the jobs read and update
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handful of users for the demo
    pub fn seeded() -> Self {
        let users = [
            ("u-1001", "Ada Lovelace", "ada@example.com"),
            ("u-1002", "Grace Hopper", "grace@example.com"),
            ("u-1003", "Alan Turing", "alan@example.com"),
        ]
        .into_iter()
        .map(|(id, name, email)| {
            (
                id.to_string(),
                User {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                    verified: false,
                    verified_at: None,
                },
            )
        })
        .collect();

        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn find(&self, user_id: &str) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    pub async fn mark_verified(&self, user_id: &str, at: DateTime<Utc>) -> bool {
        match self.users.write().await.get_mut(user_id) {
            Some(user) => {
                user.verified = true;
                user.verified_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

/// Shared state handed to every job execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub users: Arc<UserDirectory>,
    pub latency_scale: f64,
}

impl JobContext {
    pub fn new(users: Arc<UserDirectory>, latency_scale: f64) -> Self {
        Self { users, latency_scale }
    }

    /// Stand-in for a call to an external provider
    pub async fn simulate(&self, millis: u64) {
        let scaled = (millis as f64 * self.latency_scale) as u64;
        if scaled > 0 {
            tokio::time::sleep(Duration::from_millis(scaled)).await;
        }
    }

    /// Send an email through the simulated provider
    pub async fn deliver_email(
        &self,
        to: &str,
        subject: &str,
        template: Option<&str>,
    ) -> Result<EmailReceipt, JobError> {
        if !to.contains('@') {
            return Err(JobError::permanent(format!("Invalid recipient address: {}", to)));
        }

        self.simulate(2000).await;

        let sent_at = Utc::now();
        info!(to, subject, template = template.unwrap_or("default"), "Email sent");

        Ok(EmailReceipt {
            success: true,
            message_id: format!("msg_{}", sent_at.timestamp_millis()),
            sent_at,
            provider: "simulated-service".to_string(),
        })
    }
}

/// Named level or a number in range; anything else is normal
pub fn priority_from_label(label: &str) -> JobPriority {
    label.parse().unwrap_or_default()
}

fn default_priority_label() -> String {
    "normal".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_labels() {
        assert_eq!(priority_from_label("low"), JobPriority::LOW);
        assert_eq!(priority_from_label("urgent"), JobPriority::URGENT);
        assert_eq!(priority_from_label("whenever"), JobPriority::NORMAL);
    }

    #[tokio::test]
    async fn test_user_directory_verification() {
        let users = UserDirectory::seeded();
        assert_eq!(users.count().await, 3);

        assert!(users.mark_verified("u-1001", Utc::now()).await);
        assert!(users.find("u-1001").await.unwrap().verified);
        assert!(!users.mark_verified("u-missing", Utc::now()).await);
    }
}
