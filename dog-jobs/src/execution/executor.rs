use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::dispatch::{DispatchOutcome, Dispatcher};
use super::limiter::ConcurrencyLimiter;
use super::worker::Worker;
use super::ExecutorSettings;
use crate::backend::JobStore;
use crate::config::{ConfigChange, ConfigChangeListener, ConfigStore};
use crate::job::HandlerRegistry;
use crate::producer::JobQueue;
use crate::{LeasedJob, QueueError, QueueResult};

struct WorkerHandle {
    limiter: Arc<ConcurrencyLimiter>,
    task: JoinHandle<()>,
}

/// Owns one worker per activated queue and the per-queue concurrency budgets
pub struct JobExecutor {
    dispatcher: Arc<Dispatcher>,
    config: Arc<ConfigStore>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    stop: watch::Sender<Option<Duration>>,
    shut_down: AtomicBool,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        producer: JobQueue,
        settings: ExecutorSettings,
    ) -> QueueResult<Self> {
        settings.validate()?;
        let (stop, _) = watch::channel(None);
        Ok(Self {
            config: producer.config().clone(),
            dispatcher: Arc::new(Dispatcher {
                store,
                handlers,
                metrics: producer.metrics().clone(),
                producer,
                settings,
            }),
            workers: Mutex::new(HashMap::new()),
            stop,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Spawn one worker per queue, sized from the current config.
    ///
    /// All queues are checked before any worker starts.
    #[instrument(skip(self))]
    pub fn start(&self, queues: &[String]) -> QueueResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(QueueError::Shutdown);
        }

        let mut workers = self.workers.lock();
        let mut planned = Vec::with_capacity(queues.len());
        for queue in queues {
            let concurrency = self.config.get(queue)?.concurrency;
            if workers.contains_key(queue) || planned.iter().any(|(q, _)| q == queue) {
                return Err(QueueError::WorkerAlreadyStarted(queue.clone()));
            }
            planned.push((queue.clone(), concurrency));
        }

        for (queue, concurrency) in planned {
            let limiter = Arc::new(ConcurrencyLimiter::new(concurrency));
            let worker = Worker {
                queue: queue.clone(),
                limiter: limiter.clone(),
                dispatcher: self.dispatcher.clone(),
                stop: self.stop.subscribe(),
            };
            let task = tokio::spawn(worker.run());
            info!("Started worker for [{}] with concurrency {}", queue, concurrency);
            workers.insert(queue, WorkerHandle { limiter, task });
        }
        Ok(())
    }

    /// Run one already leased job to completion
    pub async fn run(&self, job: LeasedJob) -> DispatchOutcome {
        self.dispatcher.dispatch(job).await
    }

    /// Lease and run at most one job of `queue` on the calling task.
    ///
    /// When `queue` has a running worker the job takes one of its slots, and
    /// nothing is leased while all of them are busy.
    pub async fn tick(&self, queue: &str) -> QueueResult<Option<DispatchOutcome>> {
        let limiter = self.workers.lock().get(queue).map(|w| w.limiter.clone());
        let _permit = match limiter {
            Some(limiter) => match limiter.try_acquire() {
                Some(permit) => Some(permit),
                None => return Ok(None),
            },
            None => None,
        };

        let leased = self
            .dispatcher
            .store
            .lease(queue, self.dispatcher.settings.lease_duration)
            .await?;
        match leased {
            Some(job) => Ok(Some(self.run(job).await)),
            None => Ok(None),
        }
    }

    /// Change how many jobs of `queue` may run at once. Takes effect for the
    /// next lease; running jobs are not interrupted.
    pub fn set_concurrency(&self, queue: &str, concurrency: usize) -> QueueResult<()> {
        if concurrency == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "concurrency for [{queue}] must be greater than 0"
            )));
        }
        let workers = self.workers.lock();
        let worker = workers
            .get(queue)
            .ok_or_else(|| QueueError::WorkerNotFound(queue.to_string()))?;

        let previous = worker.limiter.limit();
        worker.limiter.set_limit(concurrency);
        if previous != concurrency {
            info!("Concurrency for [{}] changed {} -> {}", queue, previous, concurrency);
        }
        Ok(())
    }

    pub fn concurrency(&self, queue: &str) -> Option<usize> {
        self.workers.lock().get(queue).map(|w| w.limiter.limit())
    }

    /// Jobs of `queue` currently holding a slot
    pub fn running(&self, queue: &str) -> Option<usize> {
        self.workers.lock().get(queue).map(|w| w.limiter.running())
    }

    pub fn active_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.workers.lock().keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop leasing, wait up to `grace` for running jobs, abandon the rest.
    /// Later calls return immediately.
    pub async fn shutdown(&self, grace: Duration) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down job executor (grace {:?})", grace);
        self.stop.send_replace(Some(grace));

        let tasks: Vec<(String, JoinHandle<()>)> = self
            .workers
            .lock()
            .drain()
            .map(|(queue, handle)| (queue, handle.task))
            .collect();
        for (queue, task) in tasks {
            if let Err(e) = task.await {
                warn!("Worker for [{}] did not stop cleanly: {}", queue, e);
            }
        }
        info!("Job executor stopped");
    }

    /// Listener applying concurrency updates without keeping the executor alive
    pub fn config_listener(self: &Arc<Self>) -> Arc<dyn ConfigChangeListener> {
        Arc::new(ExecutorConfigListener(Arc::downgrade(self)))
    }
}

impl ConfigChangeListener for JobExecutor {
    fn on_config_changed(&self, change: &ConfigChange) {
        // notifications of concurrent updates may arrive out of order
        for (queue, settings) in &change.queues {
            let concurrency = self
                .config
                .get(queue)
                .map_or(settings.concurrency, |current| current.concurrency);
            match self.set_concurrency(queue, concurrency) {
                Ok(()) => {}
                Err(QueueError::WorkerNotFound(_)) => {
                    debug!("No worker for [{}] in this process", queue)
                }
                Err(e) => warn!("Failed to apply concurrency for [{}]: {}", queue, e),
            }
        }
    }
}

struct ExecutorConfigListener(Weak<JobExecutor>);

impl ConfigChangeListener for ExecutorConfigListener {
    fn on_config_changed(&self, change: &ConfigChange) {
        if let Some(executor) = self.0.upgrade() {
            executor.on_config_changed(change);
        }
    }
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("queues", &self.active_queues())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
