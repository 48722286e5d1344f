use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one handler invocation, telling the executor what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSignal {
    /// Nothing further to do
    #[default]
    Done,

    /// Run again with the same payload; the handler considers this run failed
    Retry,

    /// Run again with the same payload; used by polling and batching jobs
    Repeat,
}

impl JobSignal {
    /// Whether the executor re-enqueues the job after this signal
    pub fn reenqueues(self) -> bool {
        matches!(self, Self::Retry | Self::Repeat)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Retry => "retry",
            Self::Repeat => "repeat",
        }
    }
}

impl fmt::Display for JobSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handler return values that can be read as a [`JobSignal`].
///
/// Returning nothing, or `None`, means [`JobSignal::Done`].
pub trait IntoSignal {
    fn into_signal(self) -> JobSignal;
}

impl IntoSignal for JobSignal {
    fn into_signal(self) -> JobSignal {
        self
    }
}

impl IntoSignal for () {
    fn into_signal(self) -> JobSignal {
        JobSignal::Done
    }
}

impl IntoSignal for Option<JobSignal> {
    fn into_signal(self) -> JobSignal {
        self.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_signal_is_done() {
        assert_eq!(().into_signal(), JobSignal::Done);
        assert_eq!(None::<JobSignal>.into_signal(), JobSignal::Done);
        assert_eq!(Some(JobSignal::Repeat).into_signal(), JobSignal::Repeat);
    }

    #[test]
    fn only_retry_and_repeat_reenqueue() {
        assert!(!JobSignal::Done.reenqueues());
        assert!(JobSignal::Retry.reenqueues());
        assert!(JobSignal::Repeat.reenqueues());
    }
}
