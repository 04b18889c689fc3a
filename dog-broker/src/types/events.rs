use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, QueueName};

/// Lifecycle events published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was admitted to a queue
    Enqueued {
        job_id: JobId,
        queue: QueueName,
        job_type: String,
        eligible_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker
    Claimed {
        job_id: JobId,
        queue: QueueName,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Job failed and will run again
    Retrying {
        job_id: JobId,
        queue: QueueName,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        queue: QueueName,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        queue: QueueName,
        error: String,
        at: DateTime<Utc>,
    },

    /// Terminal job removed by retention trimming
    Evicted {
        job_id: JobId,
        queue: QueueName,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Claimed { .. } => "claimed",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Evicted { .. } => "evicted",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Evicted { job_id, .. } => job_id,
        }
    }

    /// Get the queue from any event
    pub fn queue(&self) -> QueueName {
        match self {
            Self::Enqueued { queue, .. }
            | Self::Claimed { queue, .. }
            | Self::Retrying { queue, .. }
            | Self::Completed { queue, .. }
            | Self::Failed { queue, .. }
            | Self::Evicted { queue, .. } => *queue,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Claimed { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Evicted { at, .. } => at,
        }
    }
}
