use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical request context carried explicitly across the enqueue/execute
/// boundary. Only the correlation id is persisted with the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCtx {
    /// Correlation id of the caller's logical request, if there is one
    pub correlation_id: Option<String>,
}

impl QueueCtx {
    /// Context without a caller request; a correlation id is minted on enqueue
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The caller's correlation id, or a freshly generated one
    pub fn correlation_id_or_generate(&self) -> String {
        self.correlation_id
            .clone()
            .unwrap_or_else(generate_correlation_id)
    }
}

/// Mint a new correlation id for work that has no originating request
pub fn generate_correlation_id() -> String {
    format!("job-{}", Uuid::new_v4().simple())
}
