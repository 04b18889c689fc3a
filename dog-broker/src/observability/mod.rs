pub mod metrics;
pub mod layer;

#[cfg(feature = "tracing-basic")]
pub mod tracing;

pub use metrics::{GlobalMetrics, JobTypeMetrics, LiveMetrics, MetricsSnapshot};
pub use layer::ObservabilityLayer;

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
