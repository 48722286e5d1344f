#[cfg(feature = "memory")]
pub mod memory;
pub mod prefix;
pub mod reaper;

pub use prefix::StorePrefix;
pub use reaper::LeaseReaper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{JobEvent, JobId, JobRecord, LeaseToken, LeasedJob, NewJob, QueueResult};

/// Type alias for boxed event streams
pub type BoxStream<T> = futures::stream::BoxStream<'static, T>;

/// What the store did with a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Attempts remain; the job becomes leasable again at `retry_at`
    Retrying { retry_at: DateTime<Utc> },
    /// Attempt budget exhausted
    Failed,
}

impl FailOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Durable storage primitives for queued jobs.
///
/// Every method takes the logical queue name; implementations apply their
/// [`StorePrefix`] internally. Completion and failure require the lease token
/// handed out by [`lease`](JobStore::lease), so a worker whose lease was
/// reclaimed cannot acknowledge a job someone else now owns.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job. When `options.job_id` names a record the store still
    /// holds, that record is returned and nothing is inserted.
    async fn push(&self, queue: &str, job: NewJob) -> QueueResult<JobRecord>;

    /// Lease the oldest leasable job of `queue`, if any
    async fn lease(&self, queue: &str, lease_for: Duration) -> QueueResult<Option<LeasedJob>>;

    /// Suspend until a job may be available on `queue` or `timeout` elapses
    async fn wait_for_jobs(&self, queue: &str, timeout: Duration) {
        let _ = queue;
        tokio::time::sleep(timeout).await;
    }

    /// Push the lease deadline of an active job further out
    async fn extend(
        &self,
        queue: &str,
        job_id: &JobId,
        lease_token: &LeaseToken,
        extra: Duration,
    ) -> QueueResult<()>;

    async fn complete(&self, queue: &str, job_id: &JobId, lease_token: &LeaseToken)
        -> QueueResult<()>;

    /// Record a failed attempt; the store applies the attempt budget and backoff
    async fn fail(
        &self,
        queue: &str,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
    ) -> QueueResult<FailOutcome>;

    /// Delete a job that has not been leased yet. Returns `None` when the job
    /// is unknown or already active/finished.
    async fn delete(&self, queue: &str, job_id: &JobId) -> QueueResult<Option<JobRecord>>;

    async fn get(&self, queue: &str, job_id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Return expired leases to the queue. Stores that expire leases on
    /// their own keep the default.
    async fn reclaim_expired(&self) -> QueueResult<usize> {
        Ok(0)
    }

    /// Lifecycle events for monitoring
    fn event_stream(&self) -> BoxStream<JobEvent>;
}
