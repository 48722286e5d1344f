use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::time::{interval_at, Instant as TickInstant};
use tracing::{debug, error, warn, Instrument};

use super::ExecutorSettings;
use crate::backend::{FailOutcome, JobStore};
use crate::job::{HandlerEntry, HandlerRegistry, JobContext};
use crate::observability::{job_span, unhandled_span, LiveMetrics};
use crate::producer::JobQueue;
use crate::{JobError, JobSignal, LeasedJob};

/// What happened to one leased job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded; re-enqueued when the signal asks for it
    Completed(JobSignal),
    /// Handler failed with attempts left
    Retrying,
    /// Handler failed and the attempt budget is spent
    Failed,
    /// No handler registered; acknowledged without running
    Dropped,
    /// The store rejected the acknowledgement (lease lost or store down)
    Abandoned,
}

/// Runs leased jobs through their handlers and acknowledges the outcome
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) producer: JobQueue,
    pub(crate) metrics: Arc<LiveMetrics>,
    pub(crate) settings: ExecutorSettings,
}

impl Dispatcher {
    pub(crate) async fn dispatch(&self, job: LeasedJob) -> DispatchOutcome {
        match self.handlers.resolve(job.name().as_str()) {
            Some(entry) => {
                let span = job_span(&job, &entry.display_name);
                self.execute(job, entry.clone()).instrument(span).await
            }
            None => {
                let span = unhandled_span(job.name(), job.record.correlation_id());
                self.drop_unhandled(job).instrument(span).await
            }
        }
    }

    async fn drop_unhandled(&self, job: LeasedJob) -> DispatchOutcome {
        warn!("Job handler for [{}] not found.", job.name());
        if let Err(e) = self
            .store
            .complete(job.queue(), job.id(), &job.lease_token)
            .await
        {
            warn!("Failed to acknowledge unhandled job {}: {}", job.id(), e);
            return DispatchOutcome::Abandoned;
        }
        self.metrics.increment_jobs_dropped(job.name().as_str());
        DispatchOutcome::Dropped
    }

    async fn execute(&self, job: LeasedJob, entry: HandlerEntry) -> DispatchOutcome {
        let name = job.name().as_str();
        let _active = self.metrics.track_active(job.queue());
        let started = Instant::now();

        let ctx = JobContext::new(
            job.id().clone(),
            job.name().clone(),
            job.record.attempts_made,
            job.record.correlation_id().to_string(),
            self.producer.clone(),
        );
        let execution = AssertUnwindSafe(entry.handler.handle(job.record.payload().clone(), ctx))
            .catch_unwind();

        let result = match self.with_heartbeat(&job, execution).await {
            Ok(result) => result,
            Err(panic) => Err(JobError::Panicked(panic_message(panic))),
        };

        let elapsed = started.elapsed();
        self.metrics.record_execution_time(name, elapsed);

        match result {
            Ok(signal) => self.finish(&job, signal, elapsed).await,
            Err(err) => self.fail(&job, err).await,
        }
    }

    async fn finish(
        &self,
        job: &LeasedJob,
        signal: JobSignal,
        elapsed: std::time::Duration,
    ) -> DispatchOutcome {
        let name = job.name().as_str();
        if let Err(e) = self
            .store
            .complete(job.queue(), job.id(), &job.lease_token)
            .await
        {
            warn!("Failed to acknowledge job {}: {}", job.id(), e);
            return DispatchOutcome::Abandoned;
        }
        self.metrics.increment_jobs_completed(name);
        debug!(elapsed_ms = elapsed.as_millis() as u64, %signal, "Job {} completed", job.id());

        match signal {
            JobSignal::Done => {}
            JobSignal::Retry => self.metrics.increment_jobs_retried(name),
            JobSignal::Repeat => self.metrics.increment_jobs_repeated(name),
        }
        if signal.reenqueues() {
            if let Err(e) = self.producer.readd(&job.record).await {
                error!("Failed to re-enqueue job [{}] after {}: {}", name, signal, e);
            }
        }
        DispatchOutcome::Completed(signal)
    }

    async fn fail(&self, job: &LeasedJob, err: JobError) -> DispatchOutcome {
        let name = job.name().as_str();
        match self
            .store
            .fail(job.queue(), job.id(), &job.lease_token, err.to_string())
            .await
        {
            Ok(FailOutcome::Retrying { retry_at }) => {
                warn!("Job [{}] failed, will retry at {}: {}", name, retry_at, err);
                DispatchOutcome::Retrying
            }
            Ok(FailOutcome::Failed) => {
                error!(
                    "Job [{}] failed permanently after {} attempts: {}",
                    name, job.record.attempts_made, err
                );
                self.metrics.increment_jobs_failed(name);
                DispatchOutcome::Failed
            }
            Err(e) => {
                warn!("Failed to record failure of job {}: {}", job.id(), e);
                DispatchOutcome::Abandoned
            }
        }
    }

    /// Drive `fut` while periodically extending the job's lease
    async fn with_heartbeat<F: Future>(&self, job: &LeasedJob, fut: F) -> F::Output {
        let every = self.settings.heartbeat_interval;
        let mut ticker = interval_at(TickInstant::now() + every, every);
        tokio::pin!(fut);

        loop {
            tokio::select! {
                output = &mut fut => return output,
                _ = ticker.tick() => {
                    if let Err(e) = self
                        .store
                        .extend(job.queue(), job.id(), &job.lease_token, self.settings.lease_duration)
                        .await
                    {
                        warn!("Failed to extend lease of job {}: {}", job.id(), e);
                    }
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
