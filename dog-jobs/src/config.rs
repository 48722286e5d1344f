//! # Job runtime configuration
//!
//! Per-queue settings (`concurrency`) plus queue-wide job defaults
//! (`attempts`, `removeOnComplete`, `removeOnFail`, `backoff`). The shape an
//! operator writes is:
//!
//! ```json
//! {
//!   "queue": { "attempts": 5, "removeOnComplete": true, "removeOnFail": { "age": 86400, "count": 500 } },
//!   "queues": { "copilot": { "concurrency": 1 }, "notification": { "concurrency": 10 } }
//! }
//! ```
//!
//! Values can be overridden from the environment using the DogRS
//! `PREFIX__SECTION__KEY` convention:
//!
//! ```bash
//! export DOG_JOBS__QUEUES__COPILOT__CONCURRENCY=4
//! export DOG_JOBS__QUEUE__ATTEMPTS=3
//! export DOG_JOBS__QUEUE__REMOVE_ON_FAIL='{"age":3600}'
//! ```
//!
//! At runtime [`ConfigStore::update`] validates a [`ConfigPatch`] as a whole
//! before accepting it, then notifies every [`ConfigChangeListener`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{Backoff, DefaultJobOptions, KeepJobs, QueueError, QueueRegistry, QueueResult};

/// Default environment prefix
pub const ENV_PREFIX: &str = "DOG_JOBS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueueSettings {
    pub concurrency: usize,
}

/// Full job configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(default)]
    pub queue: DefaultJobOptions,
    #[serde(default)]
    pub queues: BTreeMap<String, QueueSettings>,
}

impl JobsConfig {
    /// Defaults for every queue in the catalogue
    pub fn defaults_for(registry: &QueueRegistry) -> Self {
        Self {
            queue: DefaultJobOptions::default(),
            queues: registry
                .iter()
                .map(|def| {
                    (
                        def.name.clone(),
                        QueueSettings {
                            concurrency: def.default_concurrency,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Defaults overridden by `<prefix>__...` environment variables
    pub fn from_env(registry: &QueueRegistry, prefix: &str) -> QueueResult<Self> {
        let config = Self::defaults_for(registry).apply_env(prefix, std::env::vars())?;
        config.validate(registry)?;
        Ok(config)
    }

    /// Apply `<prefix>__...` overrides from an explicit variable list
    pub fn apply_env<I>(mut self, prefix: &str, vars: I) -> QueueResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{prefix}__");
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(&prefix) else {
                continue;
            };
            let path = stripped.to_lowercase();
            let parts: Vec<&str> = path.split("__").collect();

            match parts.as_slice() {
                ["queues", queue, "concurrency"] => {
                    let concurrency = parse_env(&key, &value, |v| v.parse::<usize>().ok())?;
                    self.queues
                        .insert(queue.to_string(), QueueSettings { concurrency });
                }
                ["queue", "attempts"] => {
                    self.queue.attempts = parse_env(&key, &value, |v| v.parse::<u32>().ok())?;
                }
                ["queue", "remove_on_complete"] => {
                    self.queue.remove_on_complete =
                        parse_env(&key, &value, |v| serde_json::from_str::<KeepJobs>(v).ok())?;
                }
                ["queue", "remove_on_fail"] => {
                    self.queue.remove_on_fail =
                        parse_env(&key, &value, |v| serde_json::from_str::<KeepJobs>(v).ok())?;
                }
                ["queue", "backoff"] => {
                    self.queue.backoff =
                        parse_env(&key, &value, |v| serde_json::from_str::<Backoff>(v).ok())?;
                }
                _ => warn!("Ignoring unknown job config variable {}", key),
            }
        }
        Ok(self)
    }

    pub fn validate(&self, registry: &QueueRegistry) -> QueueResult<()> {
        if self.queue.attempts == 0 {
            return Err(QueueError::InvalidConfig(
                "queue.attempts must be greater than 0".to_string(),
            ));
        }
        for (queue, settings) in &self.queues {
            validate_queue_settings(registry, queue, settings)?;
        }
        Ok(())
    }
}

fn validate_queue_settings(
    registry: &QueueRegistry,
    queue: &str,
    settings: &QueueSettings,
) -> QueueResult<()> {
    if !registry.contains(queue) {
        return Err(QueueError::InvalidConfig(format!("unknown queue [{queue}]")));
    }
    if settings.concurrency == 0 {
        return Err(QueueError::InvalidConfig(format!(
            "queues.{queue}.concurrency must be greater than 0"
        )));
    }
    Ok(())
}

fn parse_env<T>(key: &str, value: &str, parse: impl FnOnce(&str) -> Option<T>) -> QueueResult<T> {
    parse(value.trim())
        .ok_or_else(|| QueueError::InvalidConfig(format!("invalid value for {key}: {value:?}")))
}

/// Effective settings of one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub default_job_options: DefaultJobOptions,
}

/// Partial update submitted by the admin surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    #[serde(default)]
    pub queue: Option<DefaultJobOptions>,
    #[serde(default)]
    pub queues: BTreeMap<String, QueueSettings>,
}

impl ConfigPatch {
    /// Parse an operator-supplied JSON document, rejecting unknown fields
    pub fn from_json(value: Value) -> QueueResult<Self> {
        serde_json::from_value(value).map_err(|e| QueueError::InvalidConfig(e.to_string()))
    }

    pub fn concurrency(queue: impl Into<String>, concurrency: usize) -> Self {
        let mut patch = Self::default();
        patch.queues.insert(queue.into(), QueueSettings { concurrency });
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_none() && self.queues.is_empty()
    }
}

/// An accepted update, as delivered to listeners
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Queue settings that were part of the update
    pub queues: BTreeMap<String, QueueSettings>,
    pub defaults_changed: bool,
    /// Merged configuration after the update
    pub config: Arc<JobsConfig>,
}

/// Observer for accepted configuration updates
pub trait ConfigChangeListener: Send + Sync {
    fn on_config_changed(&self, change: &ConfigChange);
}

/// Current configuration plus change notification
pub struct ConfigStore {
    registry: Arc<QueueRegistry>,
    current: RwLock<Arc<JobsConfig>>,
    listeners: RwLock<Vec<Arc<dyn ConfigChangeListener>>>,
    updates: Mutex<()>,
    tx: watch::Sender<Arc<JobsConfig>>,
}

impl ConfigStore {
    pub fn new(registry: Arc<QueueRegistry>, config: JobsConfig) -> QueueResult<Self> {
        config.validate(&registry)?;
        let config = Arc::new(config);
        let (tx, _) = watch::channel(config.clone());
        Ok(Self {
            registry,
            current: RwLock::new(config),
            listeners: RwLock::new(Vec::new()),
            updates: Mutex::new(()),
            tx,
        })
    }

    /// Store holding the catalogue defaults
    pub fn with_defaults(registry: Arc<QueueRegistry>) -> Self {
        let config = Arc::new(JobsConfig::defaults_for(&registry));
        let (tx, _) = watch::channel(config.clone());
        Self {
            registry,
            current: RwLock::new(config),
            listeners: RwLock::new(Vec::new()),
            updates: Mutex::new(()),
            tx,
        }
    }

    pub fn snapshot(&self) -> Arc<JobsConfig> {
        self.current.read().clone()
    }

    /// Effective settings of one queue
    pub fn get(&self, queue: &str) -> QueueResult<QueueConfig> {
        let def = self
            .registry
            .get(queue)
            .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;
        let config = self.snapshot();
        let concurrency = config
            .queues
            .get(queue)
            .map(|s| s.concurrency)
            .unwrap_or(def.default_concurrency);

        let mut default_job_options = config.queue.clone();
        if let Some(keep) = def.remove_on_complete {
            default_job_options.remove_on_complete = keep;
        }

        Ok(QueueConfig {
            concurrency,
            default_job_options,
        })
    }

    /// Validate and apply an update. On error nothing changes.
    ///
    /// Listeners run after the update lock is released, so they may update
    /// the store themselves.
    pub fn update(&self, patch: ConfigPatch) -> QueueResult<ConfigChange> {
        let change = {
            let _guard = self.updates.lock();

            let mut next = (*self.snapshot()).clone();
            if let Some(defaults) = &patch.queue {
                next.queue = defaults.clone();
            }
            for (queue, settings) in &patch.queues {
                validate_queue_settings(&self.registry, queue, settings)?;
                next.queues.insert(queue.clone(), settings.clone());
            }
            next.validate(&self.registry)?;

            let next = Arc::new(next);
            *self.current.write() = next.clone();
            self.tx.send_replace(next.clone());

            ConfigChange {
                queues: patch.queues,
                defaults_changed: patch.queue.is_some(),
                config: next,
            }
        };
        info!(queues = ?change.queues.keys().collect::<Vec<_>>(), "Job config updated");

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_config_changed(&change);
        }
        Ok(change)
    }

    pub fn subscribe(&self, listener: Arc<dyn ConfigChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Latest-value channel; rapid updates coalesce into the newest snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<JobsConfig>> {
        self.tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("current", &self.snapshot())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
