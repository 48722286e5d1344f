//! Which queues a process runs workers for.
//!
//! A process declares its roles ("flavors") once at startup, e.g.
//! `DOG_JOBS_FLAVORS=graphql,doc`. The general flavors (`graphql`,
//! `allinone`) start every non-dedicated queue; a flavor named after a
//! dedicated queue starts that queue as well.

use std::collections::BTreeSet;

use crate::QueueRegistry;

pub const ENV_VAR: &str = "DOG_JOBS_FLAVORS";

pub const GRAPHQL: &str = "graphql";
pub const ALLINONE: &str = "allinone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPolicy {
    flavors: BTreeSet<String>,
}

impl ActivationPolicy {
    /// Parse a comma separated flavor list. Empty input means `graphql`.
    pub fn parse(flavors: &str) -> Self {
        let flavors: BTreeSet<String> = flavors
            .split(',')
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        if flavors.is_empty() {
            return Self::general();
        }
        Self { flavors }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var(ENV_VAR).unwrap_or_default())
    }

    pub fn general() -> Self {
        Self::only([GRAPHQL])
    }

    /// Every queue, dedicated ones included
    pub fn all_in_one() -> Self {
        Self::only([ALLINONE])
    }

    pub fn only<I, S>(flavors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flavors: flavors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn flavors(&self) -> impl Iterator<Item = &str> {
        self.flavors.iter().map(String::as_str)
    }

    fn runs_general(&self) -> bool {
        self.flavors.contains(GRAPHQL) || self.flavors.contains(ALLINONE)
    }

    pub fn is_active(&self, registry: &QueueRegistry, queue: &str) -> bool {
        let Some(def) = registry.get(queue) else {
            return false;
        };
        if def.dedicated {
            self.flavors.contains(ALLINONE) || self.flavors.contains(&def.name)
        } else {
            self.runs_general()
        }
    }

    /// Queues this process starts workers for
    pub fn activated_queues(&self, registry: &QueueRegistry) -> Vec<String> {
        registry
            .names()
            .filter(|queue| self.is_active(registry, queue))
            .map(str::to_string)
            .collect()
    }
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self::general()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_flavor_skips_dedicated_queues() {
        let registry = QueueRegistry::standard();
        let queues = ActivationPolicy::parse("graphql").activated_queues(&registry);
        assert_eq!(queues, vec!["copilot", "nightly", "notification"]);
    }

    #[test]
    fn doc_flavor_runs_only_doc() {
        let registry = QueueRegistry::standard();
        assert_eq!(ActivationPolicy::parse("doc").activated_queues(&registry), vec!["doc"]);
        assert_eq!(
            ActivationPolicy::parse(" graphql , DOC ").activated_queues(&registry),
            vec!["copilot", "doc", "nightly", "notification"]
        );
    }

    #[test]
    fn allinone_runs_everything() {
        let registry = QueueRegistry::standard();
        assert_eq!(ActivationPolicy::all_in_one().activated_queues(&registry).len(), 4);
    }

    #[test]
    fn empty_means_general() {
        assert_eq!(ActivationPolicy::parse(""), ActivationPolicy::general());
        assert!(!ActivationPolicy::parse("web").is_active(&QueueRegistry::standard(), "copilot"));
    }
}
