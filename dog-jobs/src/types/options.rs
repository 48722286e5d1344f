use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::JobId;

/// Retention policy for finished jobs.
///
/// Serialized the way queue operators usually write it: `true` removes the
/// record immediately, `false` keeps it, a number keeps that many of the
/// latest records and `{ "age": secs, "count": n }` bounds both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KeepJobsRepr", into = "KeepJobsRepr")]
pub enum KeepJobs {
    Remove,
    Keep,
    Bounded {
        /// Maximum age in seconds
        age: Option<u64>,
        /// Maximum number of retained records
        count: Option<usize>,
    },
}

impl KeepJobs {
    pub fn for_age(age: Duration) -> Self {
        Self::Bounded {
            age: Some(age.as_secs()),
            count: None,
        }
    }

    pub fn retains(&self) -> bool {
        !matches!(self, Self::Remove)
    }

    pub fn max_age(&self) -> Option<Duration> {
        match self {
            Self::Bounded { age: Some(age), .. } => Some(Duration::from_secs(*age)),
            _ => None,
        }
    }

    pub fn max_count(&self) -> Option<usize> {
        match self {
            Self::Bounded { count, .. } => *count,
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum KeepJobsRepr {
    Flag(bool),
    Count(usize),
    Bounded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        age: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
}

impl From<KeepJobsRepr> for KeepJobs {
    fn from(repr: KeepJobsRepr) -> Self {
        match repr {
            KeepJobsRepr::Flag(true) => Self::Remove,
            KeepJobsRepr::Flag(false) => Self::Keep,
            KeepJobsRepr::Count(count) => Self::Bounded {
                age: None,
                count: Some(count),
            },
            KeepJobsRepr::Bounded { age, count } => Self::Bounded { age, count },
        }
    }
}

impl From<KeepJobs> for KeepJobsRepr {
    fn from(keep: KeepJobs) -> Self {
        match keep {
            KeepJobs::Remove => Self::Flag(true),
            KeepJobs::Keep => Self::Flag(false),
            KeepJobs::Bounded { age, count } => Self::Bounded { age, count },
        }
    }
}

/// Delay applied by the store before a failed job becomes leasable again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// Constant delay in milliseconds
    Fixed { delay: u64 },
    /// `delay * 2^(attempt - 1)` milliseconds
    Exponential { delay: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed { delay: 0 }
    }
}

impl Backoff {
    const MAX_SHIFT: u32 = 20;

    /// Delay before the next attempt, given how many attempts were made
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => Duration::from_millis(delay),
            Self::Exponential { delay } => {
                let shift = attempts_made.saturating_sub(1).min(Self::MAX_SHIFT);
                Duration::from_millis(delay.saturating_mul(1u64 << shift))
            }
        }
    }
}

/// Queue-wide job defaults, part of the runtime config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultJobOptions {
    /// Attempt budget, including the first run
    pub attempts: u32,
    pub remove_on_complete: KeepJobs,
    pub remove_on_fail: KeepJobs,
    pub backoff: Backoff,
}

impl Default for DefaultJobOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            // completed jobs are removed so the same job id can be added again
            remove_on_complete: KeepJobs::Remove,
            remove_on_fail: KeepJobs::Bounded {
                age: Some(24 * 3600),
                count: Some(500),
            },
            backoff: Backoff::default(),
        }
    }
}

/// Per-enqueue overrides, merged field by field over [`DefaultJobOptions`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub attempts: Option<u32>,
    pub remove_on_complete: Option<KeepJobs>,
    pub remove_on_fail: Option<KeepJobs>,
    pub backoff: Option<Backoff>,
    /// Caller-chosen id. Adding a job whose id is still held by the store
    /// returns the existing entry instead of inserting a duplicate.
    pub job_id: Option<JobId>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_remove_on_complete(mut self, keep: KeepJobs) -> Self {
        self.remove_on_complete = Some(keep);
        self
    }

    pub fn with_remove_on_fail(mut self, keep: KeepJobs) -> Self {
        self.remove_on_fail = Some(keep);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Merge over queue defaults. Attempts below one are raised to one.
    pub fn resolve(&self, defaults: &DefaultJobOptions) -> ResolvedJobOptions {
        ResolvedJobOptions {
            attempts: self.attempts.unwrap_or(defaults.attempts).max(1),
            remove_on_complete: self.remove_on_complete.unwrap_or(defaults.remove_on_complete),
            remove_on_fail: self.remove_on_fail.unwrap_or(defaults.remove_on_fail),
            backoff: self.backoff.unwrap_or(defaults.backoff),
            job_id: self.job_id.clone(),
        }
    }
}

/// Options as stored with a job record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedJobOptions {
    pub attempts: u32,
    pub remove_on_complete: KeepJobs,
    pub remove_on_fail: KeepJobs,
    pub backoff: Backoff,
    pub job_id: Option<JobId>,
}

impl ResolvedJobOptions {
    /// Options for a signal-driven re-enqueue: same policies, fresh identity
    pub fn for_reenqueue(&self) -> JobOptions {
        JobOptions {
            attempts: Some(self.attempts),
            remove_on_complete: Some(self.remove_on_complete),
            remove_on_fail: Some(self.remove_on_fail),
            backoff: Some(self.backoff),
            job_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_jobs_reads_operator_shapes() {
        let cases = [
            ("true", KeepJobs::Remove),
            ("false", KeepJobs::Keep),
            ("100", KeepJobs::Bounded { age: None, count: Some(100) }),
            (
                r#"{"age":86400,"count":500}"#,
                KeepJobs::Bounded { age: Some(86400), count: Some(500) },
            ),
            (r#"{"age":3600}"#, KeepJobs::Bounded { age: Some(3600), count: None }),
        ];
        for (json, expected) in cases {
            let parsed: KeepJobs = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expected, "{json}");
        }
    }

    #[test]
    fn options_merge_over_defaults() {
        let defaults = DefaultJobOptions::default();
        let resolved = JobOptions::new()
            .with_attempts(2)
            .with_job_id("nightly-clean")
            .resolve(&defaults);

        assert_eq!(resolved.attempts, 2);
        assert_eq!(resolved.remove_on_complete, KeepJobs::Remove);
        assert_eq!(resolved.remove_on_fail, defaults.remove_on_fail);
        assert_eq!(resolved.job_id, Some(JobId::from("nightly-clean")));

        let reenqueue = resolved.for_reenqueue();
        assert_eq!(reenqueue.job_id, None);
        assert_eq!(reenqueue.attempts, Some(2));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let resolved = JobOptions::new().with_attempts(0).resolve(&DefaultJobOptions::default());
        assert_eq!(resolved.attempts, 1);
    }

    #[test]
    fn exponential_backoff_doubles() {
        let backoff = Backoff::Exponential { delay: 100 };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
        assert_eq!(Backoff::default().delay_for(3), Duration::ZERO);
    }

    #[test]
    fn default_options_parse_from_camel_case() {
        let parsed: DefaultJobOptions = serde_json::from_str(
            r#"{"attempts":3,"removeOnComplete":false,"backoff":{"type":"fixed","delay":250}}"#,
        )
        .unwrap();
        assert_eq!(parsed.attempts, 3);
        assert_eq!(parsed.remove_on_complete, KeepJobs::Keep);
        assert_eq!(parsed.backoff, Backoff::Fixed { delay: 250 });
        assert_eq!(parsed.remove_on_fail, DefaultJobOptions::default().remove_on_fail);
    }
}
