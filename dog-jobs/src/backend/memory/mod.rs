//! In-process [`JobStore`](crate::backend::JobStore) used for development,
//! tests and single-process deployments.

mod reaper;
mod storage;

pub use storage::{JobCounts, MemoryStore};
