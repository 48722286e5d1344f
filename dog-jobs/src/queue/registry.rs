use std::collections::BTreeMap;

use super::{QueueDef, COPILOT, DOC, NIGHTLY, NOTIFICATION};
use crate::{JobName, QueueError, QueueResult};

/// Static catalogue of the queues known to this binary. Read-only once built.
#[derive(Debug, Clone)]
pub struct QueueRegistry {
    queues: BTreeMap<String, QueueDef>,
}

impl QueueRegistry {
    pub fn builder() -> QueueRegistryBuilder {
        QueueRegistryBuilder::default()
    }

    /// The product's queues: copilot, doc (dedicated to doc-service processes),
    /// notification and the nightly maintenance queue
    pub fn standard() -> Self {
        Self {
            queues: [
                QueueDef::new(COPILOT).concurrency(1),
                QueueDef::new(DOC).concurrency(1).dedicated(),
                QueueDef::new(NOTIFICATION).concurrency(10),
                QueueDef::new(NIGHTLY).concurrency(1).maintenance(),
            ]
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect(),
        }
    }

    pub fn get(&self, queue: &str) -> Option<&QueueDef> {
        self.queues.get(queue)
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }

    /// Queue that a job name dispatches on
    pub fn resolve(&self, name: &JobName) -> QueueResult<&QueueDef> {
        self.queues
            .get(name.namespace())
            .ok_or_else(|| QueueError::UnknownQueue(name.namespace().to_string()))
    }

    /// Validate a raw job name and look up its queue in one step
    pub fn parse(&self, name: &str) -> QueueResult<(JobName, &QueueDef)> {
        let name = JobName::parse(name)?;
        let queue = self.resolve(&name)?;
        Ok((name, queue))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueDef> {
        self.queues.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Default)]
pub struct QueueRegistryBuilder {
    queues: BTreeMap<String, QueueDef>,
}

impl QueueRegistryBuilder {
    pub fn queue(mut self, def: QueueDef) -> QueueResult<Self> {
        if !is_queue_name(&def.name) {
            return Err(QueueError::InvalidConfig(format!(
                "invalid queue name: {:?}",
                def.name
            )));
        }
        if def.default_concurrency == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "queue [{}] default concurrency must be greater than 0",
                def.name
            )));
        }
        if self.queues.contains_key(&def.name) {
            return Err(QueueError::DuplicateQueue(def.name));
        }
        self.queues.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn build(self) -> QueueRegistry {
        QueueRegistry {
            queues: self.queues,
        }
    }
}

fn is_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalogue() {
        let registry = QueueRegistry::standard();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["copilot", "doc", "nightly", "notification"]);
        assert!(registry.get(DOC).unwrap().dedicated);
        assert!(registry.get(NIGHTLY).unwrap().is_maintenance());
        assert!(!registry.get(COPILOT).unwrap().is_maintenance());
        assert_eq!(registry.get(NOTIFICATION).unwrap().default_concurrency, 10);
    }

    #[test]
    fn resolves_job_names_to_queues() {
        let registry = QueueRegistry::standard();
        let (name, queue) = registry.parse("copilot.embedding.docs").unwrap();
        assert_eq!(name.action(), "embedding.docs");
        assert_eq!(queue.name, COPILOT);

        assert_eq!(
            registry.parse("billing.charge").unwrap_err(),
            QueueError::UnknownQueue("billing".into())
        );
        assert!(matches!(
            registry.parse("bogus-name-without-namespace"),
            Err(QueueError::InvalidJobName(_))
        ));
    }

    #[test]
    fn builder_rejects_bad_definitions() {
        let dup = QueueRegistry::builder()
            .queue(QueueDef::new("mail"))
            .unwrap()
            .queue(QueueDef::new("mail"));
        assert_eq!(dup.unwrap_err(), QueueError::DuplicateQueue("mail".into()));

        assert!(QueueRegistry::builder().queue(QueueDef::new("a.b")).is_err());
        assert!(QueueRegistry::builder().queue(QueueDef::new("mail").concurrency(0)).is_err());
    }
}
