use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{QueueError, QueueResult};

/// Separator between a job's namespace and its action
pub const NAMESPACE_SEPARATOR: char = '.';

/// Fully-qualified job name, `"<namespace>.<action>"`.
///
/// The namespace is everything before the first separator and names the queue
/// the job runs on. Every separator-delimited segment is made of ASCII
/// letters, digits, `_` or `-`. Actions may contain further separators
/// (`copilot.embedding.files` runs on the `copilot` queue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName {
    full: String,
    split: usize,
}

impl JobName {
    pub fn parse(name: &str) -> QueueResult<Self> {
        let split = name
            .find(NAMESPACE_SEPARATOR)
            .ok_or_else(|| QueueError::InvalidJobName(name.to_string()))?;

        let valid = name
            .split(NAMESPACE_SEPARATOR)
            .all(|segment| !segment.is_empty() && segment.chars().all(is_name_char));

        if !valid {
            return Err(QueueError::InvalidJobName(name.to_string()));
        }

        Ok(Self {
            full: name.to_string(),
            split,
        })
    }

    /// Queue this job belongs to
    pub fn namespace(&self) -> &str {
        &self.full[..self.split]
    }

    pub fn action(&self) -> &str {
        &self.full[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Namespace of a raw job name, without validating the action.
pub fn namespace(name: &str) -> Option<&str> {
    name.split_once(NAMESPACE_SEPARATOR).map(|(ns, _)| ns)
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for JobName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobName {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobName> for String {
    fn from(name: JobName) -> Self {
        name.full
    }
}

impl AsRef<str> for JobName {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_namespace_and_action() {
        let name = JobName::parse("notification.sendInvitation").unwrap();
        assert_eq!(name.namespace(), "notification");
        assert_eq!(name.action(), "sendInvitation");
        assert_eq!(name.to_string(), "notification.sendInvitation");
    }

    #[test]
    fn namespace_is_before_first_separator() {
        let name = JobName::parse("copilot.embedding.files").unwrap();
        assert_eq!(name.namespace(), "copilot");
        assert_eq!(name.action(), "embedding.files");
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in [
            "bogus-name-without-namespace",
            "",
            ".action",
            "ns.",
            "ns..action",
            "ns.act ion",
            "n$.action",
        ] {
            assert!(
                matches!(JobName::parse(bad), Err(QueueError::InvalidJobName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: JobName = serde_json::from_str("\"doc.mergePendingDocUpdates\"").unwrap();
        assert_eq!(ok.namespace(), "doc");
        assert!(serde_json::from_str::<JobName>("\"nodot\"").is_err());
    }

    proptest! {
        #[test]
        fn accepts_every_well_formed_pair(ns in "[a-zA-Z0-9_-]{1,16}", action in "[a-zA-Z0-9_-]{1,16}") {
            let raw = format!("{ns}.{action}");
            let name = JobName::parse(&raw).unwrap();
            prop_assert_eq!(name.namespace(), ns.as_str());
            prop_assert_eq!(name.action(), action.as_str());
            prop_assert_eq!(namespace(&raw), Some(ns.as_str()));
        }

        #[test]
        fn rejects_names_without_separator(raw in "[a-zA-Z0-9_-]{0,24}") {
            prop_assert!(JobName::parse(&raw).is_err());
        }
    }
}
