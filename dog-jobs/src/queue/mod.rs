pub mod registry;

pub use registry::{QueueRegistry, QueueRegistryBuilder};

use std::time::Duration;

use crate::KeepJobs;

/// Queue names of the standard catalogue
pub const COPILOT: &str = "copilot";
pub const DOC: &str = "doc";
pub const NOTIFICATION: &str = "notification";
pub const NIGHTLY: &str = "nightly";

/// How long maintenance jobs stay in the store after completing, so an
/// overlapping run with the same job id is recognised as a duplicate
pub const MAINTENANCE_RETENTION: Duration = Duration::from_secs(60 * 60);

/// A named partition of jobs with one worker group and one concurrency budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDef {
    pub name: String,
    /// Concurrency used when the runtime config has no entry for this queue
    pub default_concurrency: usize,
    /// Only started by processes whose role names this queue explicitly
    pub dedicated: bool,
    /// Queue-level completion retention, applied over the config defaults
    pub remove_on_complete: Option<KeepJobs>,
}

impl QueueDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_concurrency: 1,
            dedicated: false,
            remove_on_complete: None,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency;
        self
    }

    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }

    /// Periodic/maintenance queue: completed entries are retained for
    /// [`MAINTENANCE_RETENTION`] to detect overlapping invocations
    pub fn maintenance(mut self) -> Self {
        self.remove_on_complete = Some(KeepJobs::for_age(MAINTENANCE_RETENTION));
        self
    }

    pub fn is_maintenance(&self) -> bool {
        self.remove_on_complete.is_some_and(|keep| keep.retains())
    }
}
