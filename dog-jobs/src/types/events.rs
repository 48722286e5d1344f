use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobName};

/// Store-side lifecycle events, for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum JobEvent {
    Added {
        job_id: JobId,
        queue: String,
        name: JobName,
        at: DateTime<Utc>,
    },

    Leased {
        job_id: JobId,
        queue: String,
        lease_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// A handler failure with attempts left; the job waits for its backoff
    Retrying {
        job_id: JobId,
        queue: String,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    Completed {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Attempts exhausted
    Failed {
        job_id: JobId,
        queue: String,
        error: String,
        at: DateTime<Utc>,
    },

    /// Removed before it was leased
    Removed {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Lease expired without an ack and was reclaimed
    Stalled {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Leased { .. } => "leased",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Removed { .. } => "removed",
            Self::Stalled { .. } => "stalled",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Added { job_id, .. }
            | Self::Leased { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Removed { job_id, .. }
            | Self::Stalled { job_id, .. } => job_id,
        }
    }

    pub fn queue(&self) -> &str {
        match self {
            Self::Added { queue, .. }
            | Self::Leased { queue, .. }
            | Self::Retrying { queue, .. }
            | Self::Completed { queue, .. }
            | Self::Failed { queue, .. }
            | Self::Removed { queue, .. }
            | Self::Stalled { queue, .. } => queue,
        }
    }
}
