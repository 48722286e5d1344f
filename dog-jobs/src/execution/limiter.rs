use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    running: usize,
}

/// Per-queue concurrency budget whose limit can change while jobs run.
///
/// Raising the limit wakes waiters at once. Lowering it never interrupts
/// running jobs; new permits are withheld until enough of them finish.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    state: Mutex<LimiterState>,
    released: Notify,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState { limit, running: 0 }),
            released: Notify::new(),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(self: &Arc<Self>) -> ConcurrencyPermit {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            released.await;
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConcurrencyPermit> {
        let mut state = self.state.lock();
        if state.running >= state.limit {
            return None;
        }
        state.running += 1;
        Some(ConcurrencyPermit {
            limiter: self.clone(),
        })
    }

    pub fn set_limit(&self, limit: usize) {
        self.state.lock().limit = limit;
        self.released.notify_waiters();
    }

    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    fn release(&self) {
        {
            let mut state = self.state.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.released.notify_waiters();
    }
}

/// One occupied slot, returned on drop
#[derive(Debug)]
pub struct ConcurrencyPermit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
