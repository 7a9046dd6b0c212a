//! Structured identifiers attached to log spans, the way a pipeline stage
//! tags its own traffic for observability. Grounded on the labeling style
//! used for engine tasks in other telemetry-shaped Rust code in this space,
//! generalized here to a shell/child instead of a named pipeline task.

use std::fmt;

/// Suffix appended to the host of a recovery helper's label, so its traffic
/// is distinguishable in logs from an ordinary shell's.
const RECOVERY_SUFFIX: &str = "-offline-recovery";

/// Identifies one shell for logging, independent of whether it's the only
/// shell or one child of a [`crate::multi_shell::MultiSensorShell`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShellLabel {
    /// The configured server host, used to distinguish shells in logs when
    /// an application talks to more than one server.
    pub host: String,
    /// `None` for a standalone shell; `Some(index)` for multishell child
    /// `index`.
    pub child_index: Option<usize>,
}

impl ShellLabel {
    /// Labels a standalone shell.
    #[must_use]
    pub fn single(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            child_index: None,
        }
    }

    /// Labels one child of a multishell.
    #[must_use]
    pub fn child(host: impl Into<String>, index: usize) -> Self {
        Self {
            host: host.into(),
            child_index: Some(index),
        }
    }

    /// Labels the throwaway helper shell a startup recovery pass uses to
    /// replay spooled batches, so its traffic is distinguishable in logs
    /// from the shell that spooled them.
    #[must_use]
    pub fn recovery_helper(host: impl Into<String>) -> Self {
        Self {
            host: format!("{}{RECOVERY_SUFFIX}", host.into()),
            child_index: None,
        }
    }
}

impl fmt::Display for ShellLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.child_index {
            Some(index) => write!(f, "{}#{index}", self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_child_index_when_present() {
        let label = ShellLabel::child("http://localhost:9876", 2);
        assert_eq!(label.to_string(), "http://localhost:9876#2");
    }

    #[test]
    fn displays_bare_host_for_a_single_shell() {
        let label = ShellLabel::single("http://localhost:9876");
        assert_eq!(label.to_string(), "http://localhost:9876");
    }

    #[test]
    fn recovery_helper_tags_the_host_with_a_suffix() {
        let label = ShellLabel::recovery_helper("http://localhost:9876");
        assert_eq!(label.to_string(), "http://localhost:9876-offline-recovery");
    }
}
