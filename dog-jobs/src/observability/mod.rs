pub mod metrics;
pub mod tracing;

pub use metrics::{
    ActiveJobGuard, GlobalMetrics, JobMetrics, LiveMetrics, MetricsSnapshot, PerformanceMetrics,
};
pub use tracing::{job_span, unhandled_span, LogFormat};

#[cfg(feature = "tracing-basic")]
pub use tracing::init_tracing;
