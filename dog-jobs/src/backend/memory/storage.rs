use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::backend::{BoxStream, FailOutcome, JobStore, StorePrefix};
use crate::{
    JobEvent, JobId, JobRecord, JobStatus, KeepJobs, LeaseToken, LeasedJob, NewJob, QueueError,
    QueueResult,
};

/// State of one prefixed queue
#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) records: HashMap<JobId, JobRecord>,
    /// Waiting and delayed jobs, oldest first
    pub(crate) pending: VecDeque<JobId>,
    pub(crate) completed: VecDeque<JobId>,
    pub(crate) failed: VecDeque<JobId>,
}

impl QueueState {
    /// Move a finished record into its retention list, or drop it
    pub(crate) fn retain_finished(&mut self, record: JobRecord, keep: KeepJobs, now: DateTime<Utc>) {
        let failed = matches!(record.status, JobStatus::Failed { .. });
        let id = record.id.clone();
        if !keep.retains() {
            self.records.remove(&id);
            return;
        }
        self.records.insert(id.clone(), record);

        let list = if failed {
            &mut self.failed
        } else {
            &mut self.completed
        };
        list.push_back(id);
        prune(list, &mut self.records, keep, now);
    }

    /// Drop a finished record that has outlived its retention window
    fn evict_outlived(&mut self, id: &JobId, now: DateTime<Utc>) {
        if !self.records.get(id).is_some_and(|record| outlived(record, now)) {
            return;
        }
        self.records.remove(id);
        self.completed.retain(|kept| kept != id);
        self.failed.retain(|kept| kept != id);
    }
}

/// A terminal record older than the age bound of its retention policy
fn outlived(record: &JobRecord, now: DateTime<Utc>) -> bool {
    let keep = match record.status {
        JobStatus::Completed { .. } => record.options.remove_on_complete,
        JobStatus::Failed { .. } => record.options.remove_on_fail,
        _ => return false,
    };
    let (Some(max_age), Some(at)) = (keep.max_age(), record.finished_at()) else {
        return false;
    };
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    now - at > max_age
}

fn prune(
    list: &mut VecDeque<JobId>,
    records: &mut HashMap<JobId, JobRecord>,
    keep: KeepJobs,
    now: DateTime<Utc>,
) {
    if let Some(max_age) = keep.max_age() {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        while let Some(id) = list.front() {
            let expired = records
                .get(id)
                .and_then(JobRecord::finished_at)
                .map_or(true, |at| now - at > max_age);
            if !expired {
                break;
            }
            if let Some(id) = list.pop_front() {
                records.remove(&id);
            }
        }
    }
    if let Some(max_count) = keep.max_count() {
        while list.len() > max_count {
            if let Some(id) = list.pop_front() {
                records.remove(&id);
            }
        }
    }
}

/// `now + delay`, saturating at the end of time
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) struct Inner {
    pub(crate) queues: Mutex<HashMap<String, QueueState>>,
    notifiers: DashMap<String, Arc<Notify>>,
    pub(crate) events: broadcast::Sender<JobEvent>,
}

/// Job counts of one queue, by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// In-memory store: FIFO per queue, lease tokens and retention policies.
///
/// Clones share the same underlying data. [`MemoryStore::sharing`] returns a
/// view of the same data under another [`StorePrefix`], the way two
/// deployments can share one store without seeing each other's jobs.
#[derive(Clone)]
pub struct MemoryStore {
    pub(crate) inner: Arc<Inner>,
    pub(crate) prefix: StorePrefix,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_prefix(StorePrefix::default())
    }

    pub fn with_prefix(prefix: StorePrefix) -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                notifiers: DashMap::new(),
                events,
            }),
            prefix,
        }
    }

    /// Same data, different prefix
    pub fn sharing(&self, prefix: StorePrefix) -> Self {
        Self {
            inner: self.inner.clone(),
            prefix,
        }
    }

    pub fn prefix(&self) -> &StorePrefix {
        &self.prefix
    }

    pub fn counts(&self, queue: &str) -> JobCounts {
        let now = Utc::now();
        let queues = self.inner.queues.lock();
        let mut counts = JobCounts::default();
        if let Some(state) = queues.get(&self.prefix.key(queue)) {
            for record in state.records.values() {
                match &record.status {
                    JobStatus::Waiting => counts.waiting += 1,
                    JobStatus::Delayed { until } if *until <= now => counts.waiting += 1,
                    JobStatus::Delayed { .. } => counts.delayed += 1,
                    JobStatus::Active { .. } => counts.active += 1,
                    JobStatus::Completed { .. } => counts.completed += 1,
                    JobStatus::Failed { .. } => counts.failed += 1,
                }
            }
        }
        counts
    }

    pub(crate) fn notifier(&self, key: &str) -> Arc<Notify> {
        self.inner
            .notifiers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Check that `lease_token` still owns an active, unexpired lease
    fn owned<'a>(
        state: &'a mut QueueState,
        job_id: &JobId,
        lease_token: &LeaseToken,
        now: DateTime<Utc>,
    ) -> QueueResult<&'a mut JobRecord> {
        let record = state
            .records
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if record.status.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }
        if record.lease_token.as_ref() != Some(lease_token) {
            return Err(QueueError::InvalidLeaseToken);
        }
        if record.lease_expired(now) {
            return Err(QueueError::LeaseExpired);
        }
        Ok(record)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn push(&self, queue: &str, job: NewJob) -> QueueResult<JobRecord> {
        let key = self.prefix.key(queue);
        let record = {
            let mut queues = self.inner.queues.lock();
            let state = queues.entry(key.clone()).or_default();
            if let Some(id) = &job.options.job_id {
                state.evict_outlived(id, Utc::now());
            }

            if let Some(existing) = job
                .options
                .job_id
                .as_ref()
                .and_then(|id| state.records.get(id))
            {
                return Ok(existing.clone());
            }

            let id = job.options.job_id.clone().unwrap_or_else(JobId::generate);
            let record = JobRecord::new(id.clone(), queue.to_string(), job);
            state.records.insert(id.clone(), record.clone());
            state.pending.push_back(id);
            record
        };

        self.emit(JobEvent::Added {
            job_id: record.id.clone(),
            queue: queue.to_string(),
            name: record.name.clone(),
            at: record.created_at,
        });
        self.notifier(&key).notify_one();
        Ok(record)
    }

    async fn lease(&self, queue: &str, lease_for: Duration) -> QueueResult<Option<LeasedJob>> {
        let now = Utc::now();
        let lease_until = after(now, lease_for);

        let leased = {
            let mut queues = self.inner.queues.lock();
            let Some(state) = queues.get_mut(&self.prefix.key(queue)) else {
                return Ok(None);
            };

            let position = state.pending.iter().position(|id| {
                state.records.get(id).is_some_and(|record| match record.status {
                    JobStatus::Waiting => true,
                    JobStatus::Delayed { until } => until <= now,
                    _ => false,
                })
            });
            let Some(id) = position.and_then(|index| state.pending.remove(index)) else {
                return Ok(None);
            };
            let Some(record) = state.records.get_mut(&id) else {
                return Ok(None);
            };

            let lease_token = LeaseToken::generate();
            record.start_processing(lease_token.clone(), lease_until);
            LeasedJob {
                record: record.clone(),
                lease_token,
                lease_until,
            }
        };

        self.emit(JobEvent::Leased {
            job_id: leased.id().clone(),
            queue: queue.to_string(),
            lease_until,
            at: now,
        });
        Ok(Some(leased))
    }

    async fn wait_for_jobs(&self, queue: &str, timeout: Duration) {
        let notify = self.notifier(&self.prefix.key(queue));
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
    }

    async fn extend(
        &self,
        queue: &str,
        job_id: &JobId,
        lease_token: &LeaseToken,
        extra: Duration,
    ) -> QueueResult<()> {
        let now = Utc::now();

        let mut queues = self.inner.queues.lock();
        let state = queues
            .get_mut(&self.prefix.key(queue))
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        let record = Self::owned(state, job_id, lease_token, now)?;

        if let JobStatus::Active { lease_until } = &mut record.status {
            *lease_until = (*lease_until).max(after(now, extra));
            record.updated_at = now;
        }
        Ok(())
    }

    async fn complete(
        &self,
        queue: &str,
        job_id: &JobId,
        lease_token: &LeaseToken,
    ) -> QueueResult<()> {
        let now = Utc::now();
        {
            let mut queues = self.inner.queues.lock();
            let state = queues
                .get_mut(&self.prefix.key(queue))
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            let record = Self::owned(state, job_id, lease_token, now)?;
            record.complete();

            let record = record.clone();
            let keep = record.options.remove_on_complete;
            state.retain_finished(record, keep, now);
        }

        self.emit(JobEvent::Completed {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: now,
        });
        Ok(())
    }

    async fn fail(
        &self,
        queue: &str,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
    ) -> QueueResult<FailOutcome> {
        let now = Utc::now();
        let key = self.prefix.key(queue);
        let outcome = {
            let mut queues = self.inner.queues.lock();
            let state = queues
                .get_mut(&key)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            let record = Self::owned(state, job_id, lease_token, now)?;

            if record.can_retry() {
                let delay = record.options.backoff.delay_for(record.attempts_made);
                let retry_at = after(now, delay);
                record.schedule_retry(error.clone(), retry_at);
                state.pending.push_back(job_id.clone());
                FailOutcome::Retrying { retry_at }
            } else {
                record.fail(error.clone());
                let record = record.clone();
                let keep = record.options.remove_on_fail;
                state.retain_finished(record, keep, now);
                FailOutcome::Failed
            }
        };

        match &outcome {
            FailOutcome::Retrying { retry_at } => {
                self.emit(JobEvent::Retrying {
                    job_id: job_id.clone(),
                    queue: queue.to_string(),
                    retry_at: *retry_at,
                    error,
                    at: now,
                });
                self.notifier(&key).notify_one();
            }
            FailOutcome::Failed => self.emit(JobEvent::Failed {
                job_id: job_id.clone(),
                queue: queue.to_string(),
                error,
                at: now,
            }),
        }
        Ok(outcome)
    }

    async fn delete(&self, queue: &str, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        let removed = {
            let mut queues = self.inner.queues.lock();
            let Some(state) = queues.get_mut(&self.prefix.key(queue)) else {
                return Ok(None);
            };
            if !state
                .records
                .get(job_id)
                .is_some_and(|record| record.status.is_pending())
            {
                return Ok(None);
            }
            state.pending.retain(|id| id != job_id);
            state.records.remove(job_id)
        };

        if removed.is_some() {
            self.emit(JobEvent::Removed {
                job_id: job_id.clone(),
                queue: queue.to_string(),
                at: Utc::now(),
            });
        }
        Ok(removed)
    }

    async fn get(&self, queue: &str, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        let now = Utc::now();
        let queues = self.inner.queues.lock();
        Ok(queues
            .get(&self.prefix.key(queue))
            .and_then(|state| state.records.get(job_id))
            .filter(|record| !outlived(record, now))
            .cloned())
    }

    async fn reclaim_expired(&self) -> QueueResult<usize> {
        Ok(self.reclaim_expired_leases())
    }

    fn event_stream(&self) -> BoxStream<JobEvent> {
        let receiver = self.inner.events.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}
