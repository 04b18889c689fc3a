pub mod ids;
pub mod options;
pub mod queue;
pub mod record;
pub mod priority;
pub mod stats;
pub mod events;

pub use ids::JobId;
pub use options::JobOptions;
pub use queue::QueueName;
pub use record::{JobRecord, JobState};
pub use priority::JobPriority;
pub use stats::{QueueOverview, QueueStats};
pub use events::JobEvent;
