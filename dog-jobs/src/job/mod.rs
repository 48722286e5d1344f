pub mod registry;

pub use registry::{HandlerEntry, HandlerRegistry, HandlerRegistryBuilder};

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::producer::JobQueue;
use crate::{IntoSignal, JobError, JobId, JobName, JobSignal, QueueCtx};

/// A payload type that knows which job name it is dispatched under
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct MergePendingDocUpdates { doc_id: String }
///
/// impl Job for MergePendingDocUpdates {
///     const NAME: &'static str = "doc.mergePendingDocUpdates";
/// }
/// ```
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// `"<namespace>.<action>"`
    const NAME: &'static str;
}

/// Type-erased job handler for runtime dispatch
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value, ctx: JobContext) -> Result<JobSignal, JobError>;
}

/// Adapts an async fn taking a typed payload into a [`JobHandler`]
pub struct FnHandler<P, F> {
    f: F,
    _payload: PhantomData<fn(P)>,
}

impl<P, F> FnHandler<P, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut, R> JobHandler for FnHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, JobError>> + Send + 'static,
    R: IntoSignal + Send + 'static,
{
    async fn handle(&self, payload: Value, ctx: JobContext) -> Result<JobSignal, JobError> {
        let payload: P = serde_json::from_value(payload)?;
        (self.f)(payload, ctx).await.map(IntoSignal::into_signal)
    }
}

/// What a handler knows about the job it is running
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub name: JobName,
    pub queue: String,
    /// 1-based attempt number of this run
    pub attempt: u32,
    pub correlation_id: String,
    producer: JobQueue,
}

impl JobContext {
    pub(crate) fn new(
        job_id: JobId,
        name: JobName,
        attempt: u32,
        correlation_id: String,
        producer: JobQueue,
    ) -> Self {
        Self {
            job_id,
            queue: name.namespace().to_string(),
            name,
            attempt,
            correlation_id,
            producer,
        }
    }

    /// Context for enqueueing follow-up jobs under the same correlation id
    pub fn queue_ctx(&self) -> QueueCtx {
        QueueCtx::new().with_correlation_id(self.correlation_id.clone())
    }

    /// Producer for follow-up jobs
    pub fn jobs(&self) -> &JobQueue {
        &self.producer
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("name", &self.name)
            .field("attempt", &self.attempt)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
