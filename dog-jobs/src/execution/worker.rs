use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::limiter::ConcurrencyLimiter;

/// `None` while running, `Some(grace)` once shutdown was requested
pub(crate) type StopSignal = watch::Receiver<Option<Duration>>;

/// Lease loop of one queue
pub(crate) struct Worker {
    pub(crate) queue: String,
    pub(crate) limiter: Arc<ConcurrencyLimiter>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) stop: StopSignal,
}

impl Worker {
    pub(crate) async fn run(self) {
        let Worker {
            queue,
            limiter,
            dispatcher,
            mut stop,
        } = self;
        let settings = dispatcher.settings.clone();
        let mut in_flight = JoinSet::new();
        let mut store_failures = 0u32;

        info!("Worker for [{}] started", queue);

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Job task on [{}] ended abnormally: {}", queue, e);
                }
            }

            // take the slot first so nothing is leased that cannot start now
            let permit = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break,
                permit = limiter.acquire() => permit,
            };

            let leased = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break,
                leased = dispatcher.store.lease(&queue, settings.lease_duration) => leased,
            };

            match leased {
                Ok(Some(job)) => {
                    store_failures = 0;
                    debug!("Leased job {} from [{}]", job.id(), queue);
                    let dispatcher = dispatcher.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        dispatcher.dispatch(job).await;
                    });
                }
                Ok(None) => {
                    store_failures = 0;
                    drop(permit);
                    tokio::select! {
                        biased;
                        _ = stop_requested(&mut stop) => break,
                        _ = dispatcher.store.wait_for_jobs(&queue, settings.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    store_failures = store_failures.saturating_add(1);
                    let delay = store_backoff(
                        settings.store_retry_base,
                        settings.store_retry_max,
                        store_failures,
                    );
                    warn!(
                        "Failed to lease from [{}] (attempt {}), retrying in {:?}: {}",
                        queue, store_failures, delay, e
                    );
                    tokio::select! {
                        biased;
                        _ = stop_requested(&mut stop) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let grace = (*stop.borrow()).unwrap_or(settings.shutdown_grace);
        drain(&queue, in_flight, grace).await;
        info!("Worker for [{}] stopped", queue);
    }
}

async fn stop_requested(stop: &mut StopSignal) {
    let _ = stop.wait_for(Option::is_some).await;
}

/// Wait for running jobs up to `grace`, then abandon the rest. Their leases
/// expire and the jobs become leasable again.
async fn drain(queue: &str, mut in_flight: JoinSet<()>, grace: Duration) {
    if in_flight.is_empty() {
        return;
    }
    info!("Waiting for {} running job(s) on [{}]", in_flight.len(), queue);

    let finished = tokio::time::timeout(grace, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(
            "Shutdown grace expired; abandoning {} job(s) on [{}]",
            in_flight.len(),
            queue
        );
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}
    }
}

/// Exponential backoff with jitter for store errors
pub(crate) fn store_backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << shift).min(max);
    let jitter_ms = (delay.as_millis() as u64) / 4;
    let jitter = if jitter_ms > 0 {
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    } else {
        Duration::ZERO
    };
    delay + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);

        let first = store_backoff(base, max, 1);
        assert!(first >= base && first <= base + base / 4);

        let third = store_backoff(base, max, 3);
        assert!(third >= Duration::from_millis(400));

        let capped = store_backoff(base, max, 30);
        assert!(capped >= max && capped <= max + max / 4);
    }
}
