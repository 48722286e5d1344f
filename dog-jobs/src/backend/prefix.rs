use std::fmt;

/// Env var selecting the test prefix
pub const TESTING_ENV: &str = "DOG_JOBS_TESTING";
/// Env var naming the deployment namespace
pub const NAMESPACE_ENV: &str = "DOG_JOBS_NAMESPACE";

/// Key prefix isolating deployments that share one store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePrefix(String);

impl StorePrefix {
    pub const DEFAULT: &'static str = "dog_jobs";

    /// `dog_jobs_test` when testing, `dog_jobs_<namespace>` for a named
    /// deployment, `dog_jobs` otherwise
    pub fn resolve(testing: bool, namespace: Option<&str>) -> Self {
        if testing {
            return Self(format!("{}_test", Self::DEFAULT));
        }
        match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => Self(format!("{}_{}", Self::DEFAULT, ns)),
            None => Self(Self::DEFAULT.to_string()),
        }
    }

    pub fn from_env() -> Self {
        let testing = std::env::var(TESTING_ENV)
            .map(|v| matches!(v.as_str(), "1" | "true"))
            .unwrap_or(false);
        let namespace = std::env::var(NAMESPACE_ENV).ok();
        Self::resolve(testing, namespace.as_deref())
    }

    pub fn custom(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// Store key of a queue
    pub fn key(&self, queue: &str) -> String {
        format!("{}:{}", self.0, queue)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StorePrefix {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for StorePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
