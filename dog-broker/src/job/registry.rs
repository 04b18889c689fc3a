use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Job, Processor};
use crate::{JobError, QueueError, QueueName, QueueResult};

/// Adapts a typed [`Job`] to the JSON [`Processor`] contract
pub struct TypedProcessor<J: Job> {
    context: J::Context,
    _phantom: PhantomData<fn() -> J>,
}

impl<J: Job> TypedProcessor<J> {
    pub fn new(context: J::Context) -> Self {
        Self {
            context,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<J: Job> Processor for TypedProcessor<J> {
    async fn process(&self, payload: Value) -> Result<Value, JobError> {
        let job: J = serde_json::from_value(payload)
            .map_err(|e| JobError::permanent(format!("Failed to deserialize {}: {}", J::JOB_TYPE, e)))?;

        let output = job.execute(self.context.clone()).await?;

        serde_json::to_value(output)
            .map_err(|e| JobError::permanent(format!("Failed to serialize result: {}", e)))
    }
}

/// Processors keyed by queue and job type
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<(QueueName, String), Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor; a second registration for the same pair is rejected
    pub fn register(
        &mut self,
        queue: QueueName,
        job_type: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> QueueResult<()> {
        let job_type = job_type.into();
        let key = (queue, job_type);

        if self.processors.contains_key(&key) {
            return Err(QueueError::ProcessorAlreadyRegistered {
                queue: queue.to_string(),
                job_type: key.1,
            });
        }

        self.processors.insert(key, processor);
        Ok(())
    }

    pub fn get(&self, queue: QueueName, job_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(&(queue, job_type.to_string())).cloned()
    }

    pub fn is_registered(&self, queue: QueueName, job_type: &str) -> bool {
        self.processors.contains_key(&(queue, job_type.to_string()))
    }

    /// Queues with at least one processor
    pub fn queues(&self) -> BTreeSet<QueueName> {
        self.processors.keys().map(|(queue, _)| *queue).collect()
    }

    /// Job types registered on `queue`, sorted
    pub fn registered_types(&self, queue: QueueName) -> Vec<String> {
        let mut types: Vec<String> = self
            .processors
            .keys()
            .filter(|(q, _)| *q == queue)
            .map(|(_, job_type)| job_type.clone())
            .collect();
        types.sort();
        types
    }
}
