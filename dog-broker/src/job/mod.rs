pub mod registry;

pub use registry::{ProcessorRegistry, TypedProcessor};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::{JobError, JobOptions, QueueName};

/// Business logic invoked by workers with a job's payload
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, payload: Value) -> Result<Value, JobError>;
}

#[async_trait]
impl<F, Fut> Processor for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    async fn process(&self, payload: Value) -> Result<Value, JobError> {
        (self)(payload).await
    }
}

/// Typed job definition layered over the JSON processor contract
#[async_trait]
pub trait Job: Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Context type passed to job execution
    type Context: Send + Sync + Clone + 'static;

    /// Result type returned by job execution
    type Output: Send + Serialize + 'static;

    /// Job type identifier for dispatch
    const JOB_TYPE: &'static str;

    /// Queue the job is enqueued on
    const QUEUE: QueueName;

    /// Execute the job with the given context
    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError>;

    /// Options for this particular job. `None` defers to the broker's
    /// defaults for the job type.
    fn options(&self) -> Option<JobOptions> {
        None
    }
}
