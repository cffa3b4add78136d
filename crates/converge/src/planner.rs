//! Check-mode planning and task selection

use crate::check::{self, Preview};
use crate::context::ApplyContext;
use crate::task::{Task, TaskKind};
use serde::Serialize;

/// What a run would do with a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum PlanStatus {
    /// Desired state already holds
    Satisfied,
    /// The action would run
    Pending,
    /// Not idempotent, the action always runs
    Always,
    /// The check itself failed
    Error(String),
}

/// One task in a check-mode plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub task_name: String,
    pub kind: TaskKind,
    pub target: String,
    pub status: PlanStatus,
    #[serde(skip)]
    pub preview: Option<Preview>,
}

/// Result of checking a task sequence without changing anything
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPlan {
    pub entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    /// Check every task against the target.
    ///
    /// Later tasks are checked against the current state, not the state
    /// earlier tasks would leave behind.
    pub fn build(tasks: &[Task], ctx: &ApplyContext, with_preview: bool) -> Self {
        let entries = tasks
            .iter()
            .map(|task| {
                let status = if task.idempotent {
                    match check::is_satisfied(task, ctx) {
                        Ok(true) => PlanStatus::Satisfied,
                        Ok(false) => PlanStatus::Pending,
                        Err(e) => PlanStatus::Error(e.to_string()),
                    }
                } else {
                    PlanStatus::Always
                };

                let preview = if with_preview && status != PlanStatus::Satisfied {
                    check::preview(task, ctx).unwrap_or_else(|e| {
                        log::warn!("No preview for '{}': {}", task.name, e);
                        None
                    })
                } else {
                    None
                };

                PlanEntry {
                    task_name: task.name.clone(),
                    kind: task.kind(),
                    target: task.action.target(),
                    status,
                    preview,
                }
            })
            .collect();
        Self { entries }
    }

    /// Number of tasks whose action would run
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, PlanStatus::Pending | PlanStatus::Always))
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.status, PlanStatus::Error(_)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keep only the tasks matching a filter.
///
/// Filter format: `kind`, `kind.name`, or a bare name fragment.
pub fn filter_tasks(tasks: Vec<Task>, filter: Option<&str>) -> Vec<Task> {
    let Some(filter) = filter else {
        return tasks;
    };
    let (kind, name) = parse_filter(filter);
    tasks
        .into_iter()
        .filter(|task| {
            kind.is_none_or(|k| task.kind() == k)
                && name.is_none_or(|n| task.name.contains(n))
        })
        .collect()
}

fn parse_kind(s: &str) -> Option<TaskKind> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

/// Split a filter string into (kind, name fragment)
fn parse_filter(filter: &str) -> (Option<TaskKind>, Option<&str>) {
    if let Some(kind) = parse_kind(filter) {
        return (Some(kind), None);
    }
    match filter.split_once('.') {
        Some((kind, name)) if parse_kind(kind).is_some() => (parse_kind(kind), Some(name)),
        _ => (None, Some(filter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Action, FileContent, ServiceDesired, ServiceTask};
    use crate::testing::FakeSystem;
    use std::fs;
    use tempfile::TempDir;

    fn tasks() -> Vec<Task> {
        vec![
            Task::new(
                "motd",
                Action::FileContent(FileContent::inline("/etc/motd", "hello\n")),
            ),
            Task::new(
                "restart ssh",
                Action::ServiceState(ServiceTask {
                    service: "ssh".into(),
                    state: ServiceDesired::Restarted,
                }),
            ),
            Task::new(
                "issue",
                Action::FileContent(FileContent::inline("/etc/issue", "Ubuntu\n")),
            )
            .always(),
        ]
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("file_content"), (Some(TaskKind::FileContent), None));
        assert_eq!(
            parse_filter("service_state.ssh"),
            (Some(TaskKind::ServiceState), Some("ssh"))
        );
        assert_eq!(parse_filter("cephmon1.prod"), (None, Some("cephmon1.prod")));
    }

    #[test]
    fn test_filter_tasks() {
        assert_eq!(filter_tasks(tasks(), None).len(), 3);
        assert_eq!(filter_tasks(tasks(), Some("file_content")).len(), 2);
        let ssh = filter_tasks(tasks(), Some("ssh"));
        assert_eq!(ssh.len(), 1);
        assert_eq!(ssh[0].name, "restart ssh");
    }

    #[test]
    fn test_plan_reports_without_changing() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/motd"), "hello\n").unwrap();

        let plan = ExecutionPlan::build(&tasks(), &ctx, true);
        let statuses: Vec<_> = plan.entries.iter().map(|e| e.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![PlanStatus::Satisfied, PlanStatus::Pending, PlanStatus::Always]
        );
        assert_eq!(plan.pending(), 2);
        assert!(!plan.has_errors());
        assert!(plan.entries[0].preview.is_none());
        assert_eq!(
            plan.entries[2].preview.as_ref().map(|p| p.desired.as_str()),
            Some("Ubuntu\n")
        );
        assert!(!dir.path().join("etc/issue").exists());
        assert!(system.calls_to("systemctl").is_empty());
    }
}
