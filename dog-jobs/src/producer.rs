use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::backend::JobStore;
use crate::config::ConfigStore;
use crate::job::Job;
use crate::observability::LiveMetrics;
use crate::{
    JobData, JobId, JobName, JobOptions, JobRecord, NewJob, QueueCtx, QueueRegistry, QueueResult,
};

/// What the caller gets back from [`JobQueue::add`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    pub name: JobName,
    pub queue: String,
    pub correlation_id: String,
}

/// Producer API: add, remove and inspect jobs.
///
/// Cheap to clone; every clone talks to the same store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: Arc<ConfigStore>,
    metrics: Arc<LiveMetrics>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: Arc<ConfigStore>, metrics: Arc<LiveMetrics>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// Add a job with a freshly minted correlation id
    pub async fn add<P>(&self, name: &str, payload: &P, options: JobOptions) -> QueueResult<JobHandle>
    where
        P: Serialize + Sync + ?Sized,
    {
        self.add_in(&QueueCtx::new(), name, payload, options).await
    }

    /// Add a job carrying the caller's correlation id.
    ///
    /// The name and its queue are validated before anything is written.
    #[instrument(skip(self, ctx, payload, options))]
    pub async fn add_in<P>(
        &self,
        ctx: &QueueCtx,
        name: &str,
        payload: &P,
        options: JobOptions,
    ) -> QueueResult<JobHandle>
    where
        P: Serialize + Sync + ?Sized,
    {
        let (name, _) = self.config.registry().parse(name)?;
        let payload = serde_json::to_value(payload)?;
        self.push(name, payload, ctx.correlation_id_or_generate(), options)
            .await
    }

    /// Add a typed job under its own name
    pub async fn add_job<J: Job>(&self, job: &J, options: JobOptions) -> QueueResult<JobHandle> {
        self.add(J::NAME, job, options).await
    }

    pub async fn add_job_in<J: Job>(
        &self,
        ctx: &QueueCtx,
        job: &J,
        options: JobOptions,
    ) -> QueueResult<JobHandle> {
        self.add_in(ctx, J::NAME, job, options).await
    }

    /// Enqueue a finished job again: same name, payload, correlation id and
    /// policies, new id and a fresh attempt budget
    pub(crate) async fn readd(&self, record: &JobRecord) -> QueueResult<JobHandle> {
        self.push(
            record.name.clone(),
            record.data.payload.clone(),
            record.data.correlation_id.clone(),
            record.options.for_reenqueue(),
        )
        .await
    }

    async fn push(
        &self,
        name: JobName,
        payload: Value,
        correlation_id: String,
        options: JobOptions,
    ) -> QueueResult<JobHandle> {
        let queue = name.namespace().to_string();
        let defaults = self.config.get(&queue)?.default_job_options;

        let job = NewJob {
            name: name.clone(),
            data: JobData {
                correlation_id,
                payload,
            },
            options: options.resolve(&defaults),
        };
        let record = self.store.push(&queue, job).await?;

        self.metrics.increment_jobs_enqueued(name.as_str());
        info!("Job [{}] added; id={}", name, record.id);

        Ok(JobHandle {
            id: record.id,
            name,
            queue,
            correlation_id: record.data.correlation_id,
        })
    }

    /// Remove a job that has not started yet and return its payload.
    ///
    /// Unknown, running and finished jobs are left alone and yield `None`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &JobId, name: &str) -> QueueResult<Option<Value>> {
        let (name, queue) = self.config.registry().parse(name)?;
        let removed = self.store.delete(&queue.name, id).await?;
        match &removed {
            Some(_) => info!("Job [{}] removed; id={}", name, id),
            None => debug!("Job [{}] not removable; id={}", name, id),
        }
        Ok(removed.map(|record| record.data.payload))
    }

    /// [`remove`](Self::remove) decoding the payload
    pub async fn remove_as<P: DeserializeOwned>(&self, id: &JobId, name: &str) -> QueueResult<Option<P>> {
        match self.remove(id, name).await? {
            Some(payload) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &JobId, name: &str) -> QueueResult<Option<JobRecord>> {
        let (_, queue) = self.config.registry().parse(name)?;
        self.store.get(&queue.name, id).await
    }

    pub fn registry(&self) -> &QueueRegistry {
        self.config.registry()
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::{JobStatus, KeepJobs, QueueError};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    fn producer() -> (JobQueue, MemoryStore) {
        let store = MemoryStore::new();
        let config = Arc::new(ConfigStore::with_defaults(Arc::new(QueueRegistry::standard())));
        let queue = JobQueue::new(Arc::new(store.clone()), config, Arc::new(LiveMetrics::new()));
        (queue, store)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Merge {
        doc_id: String,
    }

    #[tokio::test]
    async fn add_stamps_correlation_and_defaults() {
        let (jobs, store) = producer();
        let ctx = QueueCtx::new().with_correlation_id("req-7");
        let handle = jobs
            .add_in(&ctx, "doc.mergePendingDocUpdates", &json!({ "docId": "d1" }), JobOptions::new())
            .await
            .unwrap();

        assert_eq!(handle.queue, "doc");
        assert_eq!(handle.correlation_id, "req-7");

        let record = jobs.get(&handle.id, "doc.mergePendingDocUpdates").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Waiting);
        assert_eq!(record.options.attempts, 5);
        assert_eq!(record.options.remove_on_complete, KeepJobs::Remove);
        assert_eq!(store.counts("doc").waiting, 1);
        assert_eq!(jobs.metrics().jobs_enqueued(), 1);
    }

    #[tokio::test]
    async fn add_mints_correlation_id() {
        let (jobs, _) = producer();
        let handle = jobs.add("copilot.embed", &json!({}), JobOptions::new()).await.unwrap();
        assert!(handle.correlation_id.starts_with("job-"));
    }

    #[tokio::test]
    async fn invalid_names_never_reach_the_store() {
        let (jobs, store) = producer();

        let err = jobs
            .add("bogus-name-without-namespace", &json!({}), JobOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidJobName(_)));

        let err = jobs.add("billing.charge", &json!({}), JobOptions::new()).await.unwrap_err();
        assert_eq!(err, QueueError::UnknownQueue("billing".into()));

        for queue in ["copilot", "doc", "notification", "nightly", "billing"] {
            assert_eq!(store.counts(queue), Default::default());
        }
    }

    #[tokio::test]
    async fn maintenance_queue_retains_completed_jobs() {
        let (jobs, _) = producer();
        let handle = jobs
            .add("nightly.cleanExpiredUserSessions", &json!({}), JobOptions::new().with_job_id("clean"))
            .await
            .unwrap();
        let record = jobs.get(&handle.id, "nightly.cleanExpiredUserSessions").await.unwrap().unwrap();
        assert_eq!(
            record.options.remove_on_complete,
            KeepJobs::Bounded { age: Some(3600), count: None }
        );

        let again = jobs
            .add("nightly.cleanExpiredUserSessions", &json!({}), JobOptions::new().with_job_id("clean"))
            .await
            .unwrap();
        assert_eq!(again.id, handle.id);
    }

    #[tokio::test]
    async fn remove_returns_payload_of_waiting_job() {
        let (jobs, store) = producer();
        let merge = Merge { doc_id: "d1".into() };
        let handle = jobs.add("doc.merge", &merge, JobOptions::new()).await.unwrap();

        let removed: Option<Merge> = jobs.remove_as(&handle.id, "doc.merge").await.unwrap();
        assert_eq!(removed, Some(merge));
        assert!(jobs.get(&handle.id, "doc.merge").await.unwrap().is_none());
        assert!(jobs.remove(&handle.id, "doc.merge").await.unwrap().is_none());

        let running = jobs.add("doc.merge", &json!({}), JobOptions::new()).await.unwrap();
        store.lease("doc", Duration::from_secs(30)).await.unwrap().unwrap();
        assert!(jobs.remove(&running.id, "doc.merge").await.unwrap().is_none());
        assert!(jobs.get(&running.id, "doc.merge").await.unwrap().is_some());
    }
}
