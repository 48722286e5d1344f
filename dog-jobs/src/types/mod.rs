pub mod ctx;
pub mod events;
pub mod ids;
pub mod name;
pub mod options;
pub mod record;
pub mod signal;

pub use ctx::{generate_correlation_id, QueueCtx};
pub use events::JobEvent;
pub use ids::{JobId, LeaseToken};
pub use name::{namespace, JobName, NAMESPACE_SEPARATOR};
pub use options::{Backoff, DefaultJobOptions, JobOptions, KeepJobs, ResolvedJobOptions};
pub use record::{JobData, JobRecord, JobStatus, LeasedJob, NewJob};
pub use signal::{IntoSignal, JobSignal};
