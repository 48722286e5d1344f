use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{FnHandler, Job, JobContext, JobHandler};
use crate::{IntoSignal, JobError, JobName, QueueError, QueueRegistry, QueueResult};

/// A registered handler with the name it is logged under
#[derive(Clone)]
pub struct HandlerEntry {
    pub name: JobName,
    /// Human readable handler name, used in spans and logs
    pub display_name: String,
    pub handler: Arc<dyn JobHandler>,
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Collects handlers during startup. Frozen into a [`HandlerRegistry`].
#[derive(Debug)]
pub struct HandlerRegistryBuilder {
    queues: Arc<QueueRegistry>,
    handlers: HashMap<String, HandlerEntry>,
}

impl HandlerRegistryBuilder {
    pub fn new(queues: Arc<QueueRegistry>) -> Self {
        Self {
            queues,
            handlers: HashMap::new(),
        }
    }

    /// Register an async fn for a job name.
    ///
    /// The name must be valid and its namespace a known queue. Registering
    /// the same name twice is an error.
    pub fn register<P, F, Fut, R>(
        &mut self,
        name: &str,
        display_name: impl Into<String>,
        f: F,
    ) -> QueueResult<&mut Self>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, JobError>> + Send + 'static,
        R: IntoSignal + Send + 'static,
    {
        self.register_handler(name, display_name, Arc::new(FnHandler::new(f)))
    }

    /// Register a typed [`Job`] under its own name
    pub fn register_job<J, F, Fut, R>(
        &mut self,
        display_name: impl Into<String>,
        f: F,
    ) -> QueueResult<&mut Self>
    where
        J: Job,
        F: Fn(J, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, JobError>> + Send + 'static,
        R: IntoSignal + Send + 'static,
    {
        self.register(J::NAME, display_name, f)
    }

    pub fn register_handler(
        &mut self,
        name: &str,
        display_name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> QueueResult<&mut Self> {
        let (name, _) = self.queues.parse(name)?;
        if self.handlers.contains_key(name.as_str()) {
            return Err(QueueError::DuplicateHandler(name.to_string()));
        }
        self.handlers.insert(
            name.to_string(),
            HandlerEntry {
                name,
                display_name: display_name.into(),
                handler,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable job name -> handler map, shared by all workers
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn builder(queues: Arc<QueueRegistry>) -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new(queues)
    }

    pub fn resolve(&self, name: &str) -> Option<&HandlerEntry> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn job_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobSignal;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Embed {
        doc_id: String,
    }

    impl Job for Embed {
        const NAME: &'static str = "copilot.embedding.docs";
    }

    fn builder() -> HandlerRegistryBuilder {
        HandlerRegistry::builder(Arc::new(QueueRegistry::standard()))
    }

    #[test]
    fn registers_and_resolves() {
        let mut builder = builder();
        builder
            .register("doc.mergePendingDocUpdates", "DocMerge", |_: serde_json::Value, _| async {
                Ok(())
            })
            .unwrap()
            .register_job::<Embed, _, _, _>("CopilotEmbedding", |_, _| async {
                Ok(JobSignal::Repeat)
            })
            .unwrap();
        let registry = builder.build();

        assert_eq!(
            registry.job_names(),
            vec!["copilot.embedding.docs", "doc.mergePendingDocUpdates"]
        );
        assert_eq!(
            registry.resolve("doc.mergePendingDocUpdates").unwrap().display_name,
            "DocMerge"
        );
        assert!(registry.resolve("doc.unknown").is_none());
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut builder = builder();
        builder
            .register("notification.sendMail", "Mail", |_: (), _| async { Ok(()) })
            .unwrap();
        let err = builder
            .register("notification.sendMail", "Mail2", |_: (), _| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, QueueError::DuplicateHandler("notification.sendMail".into()));
    }

    #[test]
    fn rejects_unknown_namespace_and_bad_names() {
        let mut builder = builder();
        let err = builder
            .register("billing.charge", "Charge", |_: (), _| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, QueueError::UnknownQueue("billing".into()));

        assert!(matches!(
            builder.register("nodot", "X", |_: (), _| async { Ok(()) }),
            Err(QueueError::InvalidJobName(_))
        ));
    }
}
