//! Log output setup for processes embedding the job runtime.
//!
//! Job execution always emits `tracing` events; installing a subscriber is
//! left to the host unless it opts into [`init_tracing`].

use tracing::Span;

use crate::{JobName, LeasedJob};

/// Log format for [`init_tracing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .try_init(),
    };
}

/// Span wrapping one handler invocation
pub fn job_span(job: &LeasedJob, handler: &str) -> Span {
    tracing::info_span!(
        "job",
        correlation_id = %job.record.correlation_id(),
        job = %job.name(),
        handler = %handler,
        job_id = %job.id(),
        attempt = job.record.attempts_made,
    )
}

/// Span for a job that has no handler
pub fn unhandled_span(name: &JobName, correlation_id: &str) -> Span {
    tracing::info_span!("job", correlation_id = %correlation_id, job = %name)
}
