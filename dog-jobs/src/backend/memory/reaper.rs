use chrono::Utc;
use tracing::debug;

use super::storage::MemoryStore;
use crate::{JobEvent, JobId, JobStatus, QueueResult};

const LEASE_EXPIRED: &str = "Lease expired";

impl MemoryStore {
    /// Return expired leases of this prefix to their queue. Jobs whose
    /// attempt budget is spent are failed instead.
    pub(crate) fn reclaim_expired_leases(&self) -> usize {
        let now = Utc::now();
        let owned = format!("{}:", self.prefix);
        let mut events = Vec::new();
        let mut woken = Vec::new();

        {
            let mut queues = self.inner.queues.lock();
            for (key, state) in queues.iter_mut().filter(|(key, _)| key.starts_with(&owned)) {
                let expired: Vec<JobId> = state
                    .records
                    .values()
                    .filter(|record| record.lease_expired(now))
                    .map(|record| record.id.clone())
                    .collect();

                for job_id in expired {
                    let Some(record) = state.records.get_mut(&job_id) else {
                        continue;
                    };
                    debug!("Reclaiming expired lease for job: {}", job_id);
                    let queue = record.queue.clone();
                    events.push(JobEvent::Stalled {
                        job_id: job_id.clone(),
                        queue: queue.clone(),
                        at: now,
                    });

                    if record.can_retry() {
                        record.schedule_retry(LEASE_EXPIRED.to_string(), now);
                        state.pending.push_back(job_id);
                        woken.push(key.clone());
                    } else {
                        record.fail(LEASE_EXPIRED.to_string());
                        let record = record.clone();
                        let keep = record.options.remove_on_fail;
                        state.retain_finished(record, keep, now);
                        events.push(JobEvent::Failed {
                            job_id,
                            queue,
                            error: LEASE_EXPIRED.to_string(),
                            at: now,
                        });
                    }
                }
            }
        }

        let reclaimed = events
            .iter()
            .filter(|event| matches!(event, JobEvent::Stalled { .. }))
            .count();
        for event in events {
            self.emit(event);
        }
        for key in woken {
            self.notifier(&key).notify_one();
        }
        reclaimed
    }

    /// Force an active lease to expire
    pub fn force_lease_expiry(&self, queue: &str, job_id: &JobId) -> QueueResult<()> {
        let mut queues = self.inner.queues.lock();
        if let Some(record) = queues
            .get_mut(&self.prefix.key(queue))
            .and_then(|state| state.records.get_mut(job_id))
        {
            if let JobStatus::Active { lease_until } = &mut record.status {
                *lease_until = Utc::now() - chrono::Duration::seconds(1);
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::{JobStore, LeaseReaper};
    use crate::{DefaultJobOptions, JobData, JobName, JobOptions, NewJob, QueueError};

    const LEASE: Duration = Duration::from_secs(30);

    fn job(attempts: u32) -> NewJob {
        NewJob {
            name: JobName::parse("copilot.embed").unwrap(),
            data: JobData {
                correlation_id: "req-1".into(),
                payload: json!({}),
            },
            options: JobOptions::new()
                .with_attempts(attempts)
                .resolve(&DefaultJobOptions::default()),
        }
    }

    #[tokio::test]
    async fn expired_lease_returns_to_waiting() {
        let store = Arc::new(MemoryStore::new());
        let pushed = store.push("copilot", job(3)).await.unwrap();
        let leased = store.lease("copilot", LEASE).await.unwrap().unwrap();

        store.force_lease_expiry("copilot", &pushed.id).unwrap();
        let reaper = LeaseReaper::new(store.clone());
        assert_eq!(reaper.tick().await, 1);

        // the abandoned worker can no longer acknowledge
        let stale = store.complete("copilot", &pushed.id, &leased.lease_token).await;
        assert_eq!(stale, Err(QueueError::InvalidLeaseToken));

        let again = store.lease("copilot", LEASE).await.unwrap().unwrap();
        assert_eq!(again.id(), &pushed.id);
        assert_eq!(again.record.attempts_made, 2);
    }

    #[tokio::test]
    async fn expired_lease_without_budget_fails() {
        let store = MemoryStore::new();
        let pushed = store.push("copilot", job(1)).await.unwrap();
        store.lease("copilot", LEASE).await.unwrap().unwrap();

        store.force_lease_expiry("copilot", &pushed.id).unwrap();
        assert_eq!(store.reclaim_expired().await.unwrap(), 1);

        let record = store.get("copilot", &pushed.id).await.unwrap().unwrap();
        assert!(matches!(record.status, JobStatus::Failed { .. }));
        assert!(store.lease("copilot", LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reaper_ignores_other_prefixes() {
        let store = MemoryStore::new();
        let other = store.sharing(crate::backend::StorePrefix::custom("other"));
        let pushed = other.push("copilot", job(3)).await.unwrap();
        other.lease("copilot", LEASE).await.unwrap().unwrap();
        other.force_lease_expiry("copilot", &pushed.id).unwrap();

        assert_eq!(store.reclaim_expired().await.unwrap(), 0);
        assert_eq!(other.reclaim_expired().await.unwrap(), 1);
    }
}
