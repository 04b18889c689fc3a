//! # dog-broker: priority and delay aware job broker
//!
//! Jobs are admitted to one of a fixed set of named queues, picked up by a
//! polling worker pool in priority order, retried with exponential backoff
//! and kept around after they finish until retention trims them.
//!
//! - **Ordering**: higher priority first, then FIFO by enqueue time
//! - **Delay gate**: a job is never claimed before its `eligible_at`
//! - **Retry**: `base_backoff * 2^(k-1)` after the k-th failure, optionally capped
//! - **Retention**: per-job `keep_completed` / `keep_failed` limits
//! - **Drain**: `stop()` lets in-flight jobs finish, bounded by a timeout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_broker::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> QueueResult<()> {
//! let broker = Broker::in_memory();
//!
//! broker.register_processor(QueueName::Email, "welcome", |payload: serde_json::Value| async move {
//!     Ok::<_, JobError>(json!({ "sent_to": payload["to"] }))
//! })?;
//!
//! broker
//!     .enqueue(
//!         QueueName::Email,
//!         "welcome",
//!         json!({ "to": "ada@example.com" }),
//!         Some(JobOptions::default().with_priority(JobPriority::HIGH)),
//!     )
//!     .await?;
//!
//! broker.start().await?;
//! // ...
//! broker.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod observability;
pub mod retry;
pub mod scheduler;
pub mod types;
pub mod worker;

// Core API exports
pub use broker::{Broker, EnqueuedJob, HealthStatus};
pub use types::{
    JobEvent, JobId, JobOptions, JobPriority, JobRecord, JobState, QueueName, QueueOverview,
    QueueStats,
};
pub use error::{JobError, QueueError, QueueResult};
pub use job::{Job, Processor, ProcessorRegistry, TypedProcessor};
pub use backend::{QueueStore, Receipt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BrokerConfig;
pub use retry::{Decision, RetryPolicy};
pub use scheduler::Scheduler;
pub use worker::{WorkerHandle, WorkerPool};

// Observability exports
pub use observability::{LiveMetrics, ObservabilityLayer};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

// Backend implementations
#[cfg(feature = "memory")]
pub use backend::memory::MemoryStore;

/// Everything needed to define jobs and run a broker
pub mod prelude {
    pub use crate::{Broker, BrokerConfig, Job, Processor, QueueStore};

    pub use crate::{
        EnqueuedJob, JobError, JobId, JobOptions, JobPriority, JobRecord, JobState, QueueError,
        QueueName, QueueResult, QueueStats,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;

    pub use crate::{JobEvent, LiveMetrics};

    pub use async_trait::async_trait;
}
