use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Live counters for job processing, shared by producer and workers
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_repeated: AtomicU64,
    jobs_dropped: AtomicU64,

    // Per-job-name counters
    job_metrics: DashMap<String, JobMetrics>,

    // Per-queue active jobs
    active: DashMap<String, Arc<ActiveGauge>>,

    performance: Mutex<PerformanceMetrics>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self {
            jobs_enqueued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_repeated: AtomicU64::new(0),
            jobs_dropped: AtomicU64::new(0),
            job_metrics: DashMap::new(),
            active: DashMap::new(),
            performance: Mutex::new(PerformanceMetrics::new()),
        }
    }

    pub fn increment_jobs_enqueued(&self, job: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().enqueued += 1;
    }

    pub fn increment_jobs_completed(&self, job: &str) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().completed += 1;
    }

    /// Attempt budget exhausted
    pub fn increment_jobs_failed(&self, job: &str) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().failed += 1;
    }

    pub fn increment_jobs_retried(&self, job: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().retried += 1;
    }

    pub fn increment_jobs_repeated(&self, job: &str) {
        self.jobs_repeated.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().repeated += 1;
    }

    /// Acknowledged without a handler
    pub fn increment_jobs_dropped(&self, job: &str) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
        self.job_metrics.entry(job.to_string()).or_default().dropped += 1;
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn jobs_repeated(&self) -> u64 {
        self.jobs_repeated.load(Ordering::Relaxed)
    }

    pub fn jobs_dropped(&self) -> u64 {
        self.jobs_dropped.load(Ordering::Relaxed)
    }

    pub fn job_metrics(&self, job: &str) -> Option<JobMetrics> {
        self.job_metrics.get(job).map(|m| m.clone())
    }

    pub fn all_job_metrics(&self) -> HashMap<String, JobMetrics> {
        self.job_metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Mark one job of `queue` as running until the guard drops
    pub fn track_active(&self, queue: &str) -> ActiveJobGuard {
        let gauge = self
            .active
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(ActiveGauge::default()))
            .clone();
        gauge.enter();
        ActiveJobGuard { gauge }
    }

    pub fn active_jobs(&self, queue: &str) -> usize {
        self.active.get(queue).map_or(0, |g| g.current())
    }

    /// Highest number of simultaneously running jobs seen on `queue`
    pub fn peak_active_jobs(&self, queue: &str) -> usize {
        self.active.get(queue).map_or(0, |g| g.peak())
    }

    pub fn record_execution_time(&self, job: &str, duration: Duration) {
        self.performance.lock().record_execution_time(job, duration);
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.performance.lock().clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            global: GlobalMetrics {
                jobs_enqueued: self.jobs_enqueued(),
                jobs_completed: self.jobs_completed(),
                jobs_failed: self.jobs_failed(),
                jobs_retried: self.jobs_retried(),
                jobs_repeated: self.jobs_repeated(),
                jobs_dropped: self.jobs_dropped(),
            },
            jobs: self.all_job_metrics(),
            active: self
                .active
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().current()))
                .collect(),
        }
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LiveMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMetrics")
            .field("jobs_enqueued", &self.jobs_enqueued())
            .field("jobs_completed", &self.jobs_completed())
            .field("jobs_failed", &self.jobs_failed())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ActiveGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ActiveGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the active-jobs gauge on drop, panics and aborts included
pub struct ActiveJobGuard {
    gauge: Arc<ActiveGauge>,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counters for one job name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub repeated: u64,
    pub dropped: u64,
}

impl JobMetrics {
    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.completed + self.failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.completed as f64 / total_processed as f64) * 100.0
        }
    }
}

/// Execution time samples per job name
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    execution_times: HashMap<String, VecDeque<Duration>>,
    last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    const MAX_SAMPLES: usize = 1000;

    pub fn new() -> Self {
        Self {
            execution_times: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn record_execution_time(&mut self, job: &str, duration: Duration) {
        let times = self.execution_times.entry(job.to_string()).or_default();
        times.push_back(duration);
        if times.len() > Self::MAX_SAMPLES {
            times.pop_front();
        }
        self.last_updated = Utc::now();
    }

    pub fn average_execution_time(&self, job: &str) -> Option<Duration> {
        let times = self.execution_times.get(job)?;
        if times.is_empty() {
            return None;
        }
        let total: Duration = times.iter().sum();
        Some(total / times.len() as u32)
    }

    pub fn percentile_execution_time(&self, job: &str, percentile: f64) -> Option<Duration> {
        let times = self.execution_times.get(job)?;
        if times.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = times.iter().copied().collect();
        sorted.sort();
        let index = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted.get(index).copied()
    }

    pub fn samples(&self, job: &str) -> usize {
        self.execution_times.get(job).map_or(0, VecDeque::len)
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub global: GlobalMetrics,
    pub jobs: HashMap<String, JobMetrics>,
    /// Currently running jobs per queue
    pub active: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMetrics {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_repeated: u64,
    pub jobs_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_job() {
        let metrics = LiveMetrics::new();
        metrics.increment_jobs_enqueued("doc.merge");
        metrics.increment_jobs_enqueued("doc.merge");
        metrics.increment_jobs_completed("doc.merge");
        metrics.increment_jobs_failed("doc.merge");

        let doc = metrics.job_metrics("doc.merge").unwrap();
        assert_eq!(doc.enqueued, 2);
        assert_eq!(doc.success_rate(), 50.0);
        assert_eq!(metrics.jobs_enqueued(), 2);
        assert!(metrics.job_metrics("copilot.embed").is_none());
    }

    #[test]
    fn active_guard_tracks_peak() {
        let metrics = LiveMetrics::new();
        let a = metrics.track_active("copilot");
        let b = metrics.track_active("copilot");
        assert_eq!(metrics.active_jobs("copilot"), 2);
        drop(a);
        drop(b);
        let _c = metrics.track_active("copilot");
        assert_eq!(metrics.active_jobs("copilot"), 1);
        assert_eq!(metrics.peak_active_jobs("copilot"), 2);
        assert_eq!(metrics.snapshot().active["copilot"], 1);
    }

    #[test]
    fn execution_time_percentiles() {
        let mut perf = PerformanceMetrics::new();
        for ms in [10, 20, 30, 40, 50] {
            perf.record_execution_time("doc.merge", Duration::from_millis(ms));
        }
        assert_eq!(perf.average_execution_time("doc.merge"), Some(Duration::from_millis(30)));
        assert_eq!(perf.percentile_execution_time("doc.merge", 100.0), Some(Duration::from_millis(50)));
        assert_eq!(perf.samples("doc.merge"), 5);
        assert!(perf.average_execution_time("other").is_none());
    }
}
