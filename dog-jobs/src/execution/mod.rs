pub mod dispatch;
pub mod executor;
pub mod limiter;
mod worker;

pub use dispatch::DispatchOutcome;
pub use executor::JobExecutor;
pub use limiter::{ConcurrencyLimiter, ConcurrencyPermit};

use std::time::Duration;

use crate::{QueueError, QueueResult};

/// Timing knobs of the worker loop
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// How long a lease lasts without a heartbeat
    pub lease_duration: Duration,
    /// How often running jobs extend their lease
    pub heartbeat_interval: Duration,
    /// Upper bound on an idle worker's sleep when no push notification arrives
    pub poll_interval: Duration,
    /// First delay after a store error at lease time
    pub store_retry_base: Duration,
    pub store_retry_max: Duration,
    /// Default wait for running jobs on shutdown
    pub shutdown_grace: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            store_retry_base: Duration::from_millis(200),
            store_retry_max: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ExecutorSettings {
    pub fn validate(&self) -> QueueResult<()> {
        if self.lease_duration.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "lease duration and heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval >= self.lease_duration {
            return Err(QueueError::InvalidConfig(
                "heartbeat interval must be shorter than the lease duration".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
