//! Error types for provisioning runs.
//!
//! Errors fall into three categories that decide how a run reacts:
//! configuration errors abort before anything executes, while action and
//! external command errors are recorded against the task that raised them.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of provisioning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed task specification, detected before execution
    Configuration,
    /// A built-in state assertion could not reach the desired state
    Action,
    /// An invoked process failed or could not be started
    ExternalCommand,
}

impl ErrorCategory {
    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration error",
            Self::Action => "action error",
            Self::ExternalCommand => "command error",
        }
    }
}

/// Errors raised while validating or executing tasks.
#[derive(Debug, Error)]
pub enum Error {
    /// A task specification is missing a field or has an invalid value
    #[error("invalid task '{task}': {message}")]
    Config {
        /// Name of the offending task
        task: String,
        /// What is wrong with it
        message: String,
    },

    /// A state assertion could not be satisfied
    #[error("{message}")]
    Action {
        /// Description of the failure
        message: String,
    },

    /// Filesystem operation failed
    #[error("{}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A command ran but exited unsuccessfully
    #[error("`{command}` exited with {}: {stderr}", exit_label(*exit_code))]
    ExternalCommand {
        /// Rendered command line
        command: String,
        /// Exit code, `None` when terminated by a signal
        exit_code: Option<i32>,
        /// Trimmed standard error
        stderr: String,
    },

    /// A command could not be started at all
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl Error {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config { .. } => ErrorCategory::Configuration,
            Error::Action { .. } | Error::Io { .. } => ErrorCategory::Action,
            Error::ExternalCommand { .. } | Error::Spawn { .. } => ErrorCategory::ExternalCommand,
        }
    }

    /// Build a configuration error for a named task.
    pub fn config(task: &str, message: impl Into<String>) -> Self {
        Error::Config {
            task: task.to_string(),
            message: message.into(),
        }
    }

    /// Build an action error.
    pub fn action(message: impl Into<String>) -> Self {
        Error::Action {
            message: message.into(),
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::config("t", "missing field").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(Error::action("nope").category(), ErrorCategory::Action);
        assert_eq!(
            Error::io("/etc/hosts", std::io::Error::other("denied")).category(),
            ErrorCategory::Action
        );
        let err = Error::ExternalCommand {
            command: "ceph-deploy new mon1".into(),
            exit_code: Some(2),
            stderr: "boom".into(),
        };
        assert_eq!(err.category(), ErrorCategory::ExternalCommand);
    }

    #[test]
    fn test_external_command_message_carries_stderr() {
        let err = Error::ExternalCommand {
            command: "ssh-keygen -b 4096".into(),
            exit_code: Some(1),
            stderr: "Permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "`ssh-keygen -b 4096` exited with code 1: Permission denied"
        );

        let killed = Error::ExternalCommand {
            command: "sleep 10".into(),
            exit_code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_config_message() {
        let err = Error::config("sshd", "missing field `path`");
        assert_eq!(err.to_string(), "invalid task 'sshd': missing field `path`");
    }
}
