use serde::{Deserialize, Serialize};

use super::{JobRecord, JobState, QueueName};

/// Per-state job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub total: usize,
}

impl QueueStats {
    /// Count one job in `state`
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::DelayedRetry => self.delayed += 1,
        }
        self.total += 1;
    }
}

/// Dashboard view of a queue: counts plus the latest terminal jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueOverview {
    pub queue: QueueName,
    pub counts: QueueStats,
    pub recent_completed: Vec<JobRecord>,
    pub recent_failed: Vec<JobRecord>,
}
