use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobId, JobName, LeaseToken, ResolvedJobOptions};

/// Job status lifecycle inside the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    /// Leasable now
    Waiting,

    /// Waiting for a store-level retry backoff to elapse
    Delayed { until: DateTime<Utc> },

    /// Leased by a worker
    Active { lease_until: DateTime<Utc> },

    /// Finished and retained by the completion policy
    Completed { completed_at: DateTime<Utc> },

    /// Attempts exhausted, retained by the failure policy
    Failed { failed_at: DateTime<Utc>, error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Not yet leased, so it can still be cancelled
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Waiting | Self::Delayed { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed { .. } => "delayed",
            Self::Active { .. } => "active",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What travels through the store for one job: the payload together with
/// the correlation id of the request that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub correlation_id: String,
    pub payload: Value,
}

/// A job submission, before the store has assigned it an identity
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: JobName,
    pub data: JobData,
    pub options: ResolvedJobOptions,
}

/// Job record - runtime state stored by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub name: JobName,
    /// Queue (namespace) the job lives on
    pub queue: String,
    pub data: JobData,
    pub options: ResolvedJobOptions,
    pub status: JobStatus,
    /// Number of times the job has been leased
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub lease_token: Option<LeaseToken>,
}

impl JobRecord {
    pub fn new(id: JobId, queue: String, job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: job.name,
            queue,
            data: job.data,
            options: job.options,
            status: JobStatus::Waiting,
            attempts_made: 0,
            created_at: now,
            updated_at: now,
            last_error: None,
            lease_token: None,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.data.payload
    }

    pub fn correlation_id(&self) -> &str {
        &self.data.correlation_id
    }

    /// Whether the attempt budget allows another run after a failure
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.options.attempts
    }

    pub fn lease_until(&self) -> Option<DateTime<Utc>> {
        match self.status {
            JobStatus::Active { lease_until } => Some(lease_until),
            _ => None,
        }
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_until().is_some_and(|until| until < now)
    }

    /// Start processing with a lease
    pub fn start_processing(&mut self, lease_token: LeaseToken, lease_until: DateTime<Utc>) {
        self.status = JobStatus::Active { lease_until };
        self.lease_token = Some(lease_token);
        self.attempts_made += 1;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Completed { completed_at: now };
        self.lease_token = None;
        self.updated_at = now;
    }

    /// Fail the job permanently
    pub fn fail(&mut self, error: String) {
        let now = Utc::now();
        self.status = JobStatus::Failed {
            failed_at: now,
            error: error.clone(),
        };
        self.last_error = Some(error);
        self.lease_token = None;
        self.updated_at = now;
    }

    /// Release the lease and schedule another attempt
    pub fn schedule_retry(&mut self, error: String, retry_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = if retry_at > now {
            JobStatus::Delayed { until: retry_at }
        } else {
            JobStatus::Waiting
        };
        self.last_error = Some(error);
        self.lease_token = None;
        self.updated_at = now;
    }

    /// When the job reached a terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            JobStatus::Completed { completed_at } => Some(*completed_at),
            JobStatus::Failed { failed_at, .. } => Some(*failed_at),
            _ => None,
        }
    }
}

/// A job that has been leased for processing
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub record: JobRecord,
    pub lease_token: LeaseToken,
    pub lease_until: DateTime<Utc>,
}

impl LeasedJob {
    pub fn id(&self) -> &JobId {
        &self.record.id
    }

    pub fn name(&self) -> &JobName {
        &self.record.name
    }

    pub fn queue(&self) -> &str {
        &self.record.queue
    }

    /// Check if the lease is still valid
    pub fn lease_valid(&self, now: DateTime<Utc>) -> bool {
        self.lease_until > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultJobOptions, JobOptions};
    use serde_json::json;

    fn record(attempts: u32) -> JobRecord {
        let job = NewJob {
            name: JobName::parse("doc.mergePendingDocUpdates").unwrap(),
            data: JobData {
                correlation_id: "req-1".into(),
                payload: json!({ "docId": "d1" }),
            },
            options: JobOptions::new()
                .with_attempts(attempts)
                .resolve(&DefaultJobOptions::default()),
        };
        JobRecord::new(JobId::generate(), "doc".into(), job)
    }

    #[test]
    fn lease_counts_attempts() {
        let mut record = record(2);
        assert_eq!(record.status, JobStatus::Waiting);

        record.start_processing(LeaseToken::generate(), Utc::now() + chrono::Duration::seconds(30));
        assert!(record.status.is_active());
        assert_eq!(record.attempts_made, 1);
        assert!(record.can_retry());

        record.schedule_retry("boom".into(), Utc::now());
        assert_eq!(record.status, JobStatus::Waiting);
        record.start_processing(LeaseToken::generate(), Utc::now() + chrono::Duration::seconds(30));
        assert!(!record.can_retry());
    }

    #[test]
    fn future_retry_is_delayed() {
        let mut record = record(3);
        record.start_processing(LeaseToken::generate(), Utc::now());
        record.schedule_retry("boom".into(), Utc::now() + chrono::Duration::seconds(10));
        assert!(matches!(record.status, JobStatus::Delayed { .. }));
        assert!(record.status.is_pending());
        assert_eq!(record.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn expired_lease_detected() {
        let mut record = record(1);
        record.start_processing(LeaseToken::generate(), Utc::now() - chrono::Duration::seconds(1));
        assert!(record.lease_expired(Utc::now()));
        record.complete();
        assert!(!record.lease_expired(Utc::now()));
        assert!(record.finished_at().is_some());
    }
}
