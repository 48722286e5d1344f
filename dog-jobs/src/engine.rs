use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::activation::ActivationPolicy;
use crate::backend::{JobStore, LeaseReaper};
use crate::config::{ConfigStore, JobsConfig, ENV_PREFIX};
use crate::execution::{ExecutorSettings, JobExecutor};
use crate::job::{HandlerRegistry, HandlerRegistryBuilder};
use crate::observability::LiveMetrics;
use crate::producer::JobQueue;
use crate::{QueueRegistry, QueueResult};

/// Assembles the job runtime of one process
pub struct JobEngineBuilder {
    store: Arc<dyn JobStore>,
    queues: QueueRegistry,
    config: Option<JobsConfig>,
    config_from_env: bool,
    activation: ActivationPolicy,
    settings: ExecutorSettings,
    reaper_interval: Duration,
}

impl JobEngineBuilder {
    pub fn queues(mut self, queues: QueueRegistry) -> Self {
        self.queues = queues;
        self
    }

    pub fn config(mut self, config: JobsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Start from catalogue defaults overridden by `DOG_JOBS__...` variables
    pub fn config_from_env(mut self) -> Self {
        self.config_from_env = true;
        self
    }

    pub fn activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Register handlers and freeze the registry
    pub fn build<F>(self, register: F) -> QueueResult<JobEngine>
    where
        F: FnOnce(&mut HandlerRegistryBuilder) -> QueueResult<()>,
    {
        let queues = Arc::new(self.queues);
        let config = match (self.config, self.config_from_env) {
            (Some(config), _) => config,
            (None, true) => JobsConfig::from_env(&queues, ENV_PREFIX)?,
            (None, false) => JobsConfig::defaults_for(&queues),
        };
        let config = Arc::new(ConfigStore::new(queues.clone(), config)?);

        let mut handlers = HandlerRegistry::builder(queues.clone());
        register(&mut handlers)?;
        let handlers = Arc::new(handlers.build());

        let producer = JobQueue::new(self.store.clone(), config.clone(), Arc::new(LiveMetrics::new()));
        let executor = Arc::new(JobExecutor::new(
            self.store.clone(),
            handlers.clone(),
            producer.clone(),
            self.settings.clone(),
        )?);
        config.subscribe(executor.config_listener());

        Ok(JobEngine {
            queues,
            config,
            handlers,
            producer,
            executor,
            store: self.store,
            activation: self.activation,
            shutdown_grace: self.settings.shutdown_grace,
            reaper_interval: self.reaper_interval,
            reaper: Mutex::new(None),
        })
    }
}

/// Producer, executor and lease reaper of one process
pub struct JobEngine {
    queues: Arc<QueueRegistry>,
    config: Arc<ConfigStore>,
    handlers: Arc<HandlerRegistry>,
    producer: JobQueue,
    executor: Arc<JobExecutor>,
    store: Arc<dyn JobStore>,
    activation: ActivationPolicy,
    shutdown_grace: Duration,
    reaper_interval: Duration,
    reaper: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl JobEngine {
    pub fn builder(store: Arc<dyn JobStore>) -> JobEngineBuilder {
        JobEngineBuilder {
            store,
            queues: QueueRegistry::standard(),
            config: None,
            config_from_env: false,
            activation: ActivationPolicy::default(),
            settings: ExecutorSettings::default(),
            reaper_interval: LeaseReaper::DEFAULT_INTERVAL,
        }
    }

    /// Start workers for the queues this process is activated for.
    /// Returns the started queues.
    pub fn start(&self) -> QueueResult<Vec<String>> {
        let queues = self.activation.activated_queues(&self.queues);
        self.executor.start(&queues)?;

        let mut reaper = self.reaper.lock();
        if reaper.is_none() {
            let (stop, stop_rx) = watch::channel(false);
            let task = tokio::spawn(
                LeaseReaper::with_interval(self.store.clone(), self.reaper_interval).run(stop_rx),
            );
            *reaper = Some((stop, task));
        }

        info!("Job engine started; queues={:?}", queues);
        Ok(queues)
    }

    /// Shut down with the configured grace period
    pub async fn shutdown(&self) {
        self.shutdown_with(self.shutdown_grace).await;
    }

    pub async fn shutdown_with(&self, grace: Duration) {
        self.executor.shutdown(grace).await;

        let reaper = self.reaper.lock().take();
        if let Some((stop, task)) = reaper {
            let _ = stop.send(true);
            let _ = task.await;
        }
    }

    /// Producer handle for adding, removing and inspecting jobs
    pub fn queue(&self) -> &JobQueue {
        &self.producer
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn queues(&self) -> &Arc<QueueRegistry> {
        &self.queues
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        self.producer.metrics()
    }

    pub fn activation(&self) -> &ActivationPolicy {
        &self.activation
    }
}
