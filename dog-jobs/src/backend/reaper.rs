use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::JobStore;

/// Periodically returns expired leases to their queues
pub struct LeaseReaper {
    store: Arc<dyn JobStore>,
    interval: Duration,
}

impl LeaseReaper {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(store: Arc<dyn JobStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until `stop` flips to true
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting lease reaper with interval: {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        debug!("Lease reaper stopped");
                        return;
                    }
                    continue;
                }
            }

            self.tick().await;
        }
    }

    /// One reclaim cycle
    pub async fn tick(&self) -> usize {
        match self.store.reclaim_expired().await {
            Ok(0) => {
                debug!("No expired leases found");
                0
            }
            Ok(reclaimed) => {
                info!("Reclaimed {} expired leases", reclaimed);
                reclaimed
            }
            Err(e) => {
                warn!("Error during lease reaping: {}", e);
                0
            }
        }
    }
}
