//! # dog-jobs: Background Job Runtime for DogRS Services
//!
//! **Named jobs, durable queues, signal-driven re-enqueue**
//!
//! dog-jobs moves slow or deferrable work out of request handling: a caller
//! adds a job named `"<namespace>.<action>"` with a JSON payload, the job is
//! persisted in a [`JobStore`](backend::JobStore), and a worker group for the
//! namespace's queue leases it and runs the one handler registered for that
//! name. The handler's [`JobSignal`] decides what happens next.
//!
//! ## Features
//!
//! - **Queue catalogue**: `copilot`, `doc` (dedicated), `notification` and the
//!   `nightly` maintenance queue, each with its own concurrency budget
//! - **Live concurrency**: [`ConfigStore::update`](config::ConfigStore::update)
//!   validates and applies per-queue concurrency without a restart
//! - **Signals**: `Done` finishes, `Retry` and `Repeat` enqueue the same job again
//!   under the same correlation id
//! - **Leases**: workers heartbeat their leases; expired leases are reclaimed
//! - **Retention**: `removeOnComplete` / `removeOnFail` and job-id de-duplication
//! - **Observability**: `tracing` spans per job, live counters and a store event stream
//!
//! ## 🚀 Quick Start
//!
//! ```rust,ignore
//! use dog_jobs::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct MergePendingDocUpdates {
//!     doc_id: String,
//! }
//!
//! impl Job for MergePendingDocUpdates {
//!     const NAME: &'static str = "doc.mergePendingDocUpdates";
//! }
//!
//! let engine = JobEngine::builder(Arc::new(MemoryStore::new()))
//!     .activation(ActivationPolicy::from_env())
//!     .config_from_env()
//!     .build(|handlers| {
//!         handlers.register_job("DocMerge", |job: MergePendingDocUpdates, ctx| async move {
//!             merge(&job.doc_id).await.map_err(JobError::failed)?;
//!             Ok(JobSignal::Done)
//!         })?;
//!         Ok(())
//!     })?;
//!
//! engine.start()?;
//!
//! let ctx = QueueCtx::new().with_correlation_id(request_id);
//! engine
//!     .queue()
//!     .add_job_in(&ctx, &MergePendingDocUpdates { doc_id }, JobOptions::new())
//!     .await?;
//!
//! engine.shutdown().await;
//! ```

pub mod activation;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod job;
pub mod observability;
pub mod producer;
pub mod queue;
pub mod types;

pub use types::{
    generate_correlation_id, namespace, Backoff, DefaultJobOptions, IntoSignal, JobData, JobEvent,
    JobId, JobName, JobOptions, JobRecord, JobSignal, JobStatus, KeepJobs, LeaseToken, LeasedJob,
    NewJob, QueueCtx, ResolvedJobOptions, NAMESPACE_SEPARATOR,
};
pub use error::{JobError, QueueError, QueueResult};
pub use queue::{QueueDef, QueueRegistry, QueueRegistryBuilder};

pub use activation::ActivationPolicy;
pub use backend::{FailOutcome, JobStore, LeaseReaper, StorePrefix};
pub use config::{ConfigChange, ConfigChangeListener, ConfigPatch, ConfigStore, JobsConfig, QueueConfig};
pub use engine::{JobEngine, JobEngineBuilder};
pub use execution::{DispatchOutcome, ExecutorSettings, JobExecutor};
pub use job::{HandlerRegistry, Job, JobContext, JobHandler};
pub use observability::LiveMetrics;
pub use producer::{JobHandle, JobQueue};

#[cfg(feature = "memory")]
pub use backend::memory::MemoryStore;

/// Everything a service needs to define, register and add jobs
pub mod prelude {
    pub use crate::{
        ActivationPolicy, ConfigPatch, Job, JobContext, JobEngine, JobError, JobHandle, JobId,
        JobOptions, JobQueue, JobSignal, KeepJobs, QueueCtx, QueueError, QueueResult,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
