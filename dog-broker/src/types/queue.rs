use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::QueueError;

/// The named queues the broker owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueName {
    Email,
    UserProcessing,
    DataExport,
    Notifications,
}

impl QueueName {
    /// Every queue, in declaration order
    pub fn all() -> &'static [QueueName] {
        &[Self::Email, Self::UserProcessing, Self::DataExport, Self::Notifications]
    }

    /// Canonical store name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email-queue",
            Self::UserProcessing => "user-processing-queue",
            Self::DataExport => "data-export-queue",
            Self::Notifications => "notifications-queue",
        }
    }

    /// Enum-style key, used for per-queue environment overrides
    pub fn key(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::UserProcessing => "USER_PROCESSING",
            Self::DataExport => "DATA_EXPORT",
            Self::Notifications => "NOTIFICATIONS",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        let short = normalized.strip_suffix("-queue").unwrap_or(&normalized);
        match short {
            "email" => Ok(Self::Email),
            "user-processing" => Ok(Self::UserProcessing),
            "data-export" => Ok(Self::DataExport),
            "notifications" => Ok(Self::Notifications),
            _ => Err(QueueError::config(format!("Invalid queue name: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spellings() {
        for s in ["email", "email-queue", "EMAIL", "Email-Queue"] {
            assert_eq!(s.parse::<QueueName>().unwrap(), QueueName::Email);
        }
        assert_eq!("USER_PROCESSING".parse::<QueueName>().unwrap(), QueueName::UserProcessing);
        assert_eq!("data-export-queue".parse::<QueueName>().unwrap(), QueueName::DataExport);
        assert_eq!("notifications".parse::<QueueName>().unwrap(), QueueName::Notifications);
    }

    #[test]
    fn test_unknown_queue_is_configuration_error() {
        let err = "sms".parse::<QueueName>().unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
    }

    #[test]
    fn test_round_trip_through_display() {
        for queue in QueueName::all() {
            assert_eq!(queue.to_string().parse::<QueueName>().unwrap(), *queue);
        }
    }
}
