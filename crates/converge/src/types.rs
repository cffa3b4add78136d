//! Core types for execution results and reports

use crate::error::{Error, ErrorCategory};
use crate::task::TaskKind;
use serde::{Deserialize, Serialize};

/// Outcome of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The desired state already held, nothing was done
    Skipped,
    /// The action ran and succeeded
    Changed,
    /// The check or the action failed
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Skipped => "skipped",
            TaskStatus::Changed => "changed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Result of one task within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Error message when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    /// Captured stdout of the action, when it ran a command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ExecutionResult {
    pub fn skipped(task_name: &str, kind: TaskKind) -> Self {
        Self {
            task_name: task_name.to_string(),
            kind,
            status: TaskStatus::Skipped,
            error: None,
            category: None,
            output: None,
        }
    }

    pub fn changed(task_name: &str, kind: TaskKind, output: Option<String>) -> Self {
        Self {
            task_name: task_name.to_string(),
            kind,
            status: TaskStatus::Changed,
            error: None,
            category: None,
            output: output.filter(|o| !o.trim().is_empty()),
        }
    }

    pub fn failed(task_name: &str, kind: TaskKind, error: &Error) -> Self {
        Self {
            task_name: task_name.to_string(),
            kind,
            status: TaskStatus::Failed,
            error: Some(error.to_string()),
            category: Some(error.category()),
            output: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub skipped: usize,
    pub changed: usize,
    pub failed: usize,
    pub not_run: usize,
}

impl RunSummary {
    /// Total number of tasks in the run, executed or not
    pub fn total(&self) -> usize {
        self.skipped + self.changed + self.failed + self.not_run
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &RunSummary) {
        self.skipped += other.skipped;
        self.changed += other.changed;
        self.failed += other.failed;
        self.not_run += other.not_run;
    }
}

/// Ordered outcomes of one execution of a task sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<ExecutionResult>,
    /// Names of tasks left unexecuted after a failure stopped the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<String>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            not_run: self.not_run.len(),
            ..RunSummary::default()
        };
        for result in &self.results {
            match result.status {
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Changed => summary.changed += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Statuses in task order
    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.results.iter().map(|r| r.status).collect()
    }

    /// Whether no task failed
    pub fn is_success(&self) -> bool {
        !self.results.iter().any(ExecutionResult::is_failed)
    }

    /// Process exit status for this report
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.is_failed())
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Stop at the first failed task instead of continuing with the rest
    pub stop_on_failure: bool,
    /// Worker threads used when several targets run at once
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            stop_on_failure: true,
            jobs: 4,
        }
    }
}
