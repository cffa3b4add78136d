//! Terminal progress for task runs

use crate::ui;
use colored::Colorize;
use converge::{ExecutionResult, ProgressCallback, Task, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner while a task runs, then one line per outcome
pub struct TerminalProgress {
    spinner: Option<ProgressBar>,
    quiet: bool,
    verbose: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            spinner: None,
            quiet,
            verbose,
        }
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Text shown after the task name for an outcome
fn outcome_detail(result: &ExecutionResult, verbose: bool) -> Option<String> {
    match result.status {
        TaskStatus::Failed => {
            let category = result.category.map(|c| c.label()).unwrap_or("error");
            let message = result.error.as_deref().unwrap_or("unknown error");
            Some(format!("{category}: {message}"))
        }
        TaskStatus::Changed if verbose => result
            .output
            .as_deref()
            .map(|o| ui::truncate(o.trim(), 120)),
        _ => None,
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_task_start(&mut self, index: usize, total: usize, task: &Task) {
        if self.quiet {
            return;
        }
        self.clear_spinner();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_message(format!(
            "{} {}",
            format!("[{}/{}]", index + 1, total).dimmed(),
            ui::truncate(&task.name, 60)
        ));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn on_task_complete(&mut self, result: &ExecutionResult) {
        self.clear_spinner();
        if self.quiet && result.status != TaskStatus::Failed {
            return;
        }

        let label = format!("{} {}", result.task_name, format!("({})", result.kind).dimmed());
        let line = match outcome_detail(result, self.verbose) {
            Some(detail) if result.status == TaskStatus::Failed => {
                format!("{label}\n      {}", detail.red())
            }
            Some(detail) => format!("{label}\n      {}", detail.dimmed()),
            None => label,
        };

        if result.status == TaskStatus::Failed {
            eprintln!("  {} {}", ui::status_symbol(result.status), line);
        } else {
            println!("  {} {}", ui::status_symbol(result.status), line);
        }
    }

    fn on_abort(&mut self, not_run: &[String]) {
        self.clear_spinner();
        if self.quiet {
            return;
        }
        println!(
            "  {} Stopped, {} task(s) not run:",
            "⚠".yellow(),
            not_run.len()
        );
        for name in not_run {
            ui::dim(&format!("  - {name}"));
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Error, TaskKind};

    #[test]
    fn test_failed_detail_names_category() {
        let err = Error::ExternalCommand {
            command: "apt-get install -y ntp".into(),
            exit_code: Some(100),
            stderr: "E: Unable to locate package ntp".into(),
        };
        let result = ExecutionResult::failed("ntp", TaskKind::PackageInstalled, &err);
        let detail = outcome_detail(&result, false).unwrap();
        assert!(detail.starts_with(err.category().label()));
        assert!(detail.contains("Unable to locate package"));
    }

    #[test]
    fn test_changed_output_only_when_verbose() {
        let result = ExecutionResult::changed(
            "keygen",
            TaskKind::ShellCommand,
            Some("Generating public/private rsa key pair.\n".into()),
        );
        assert_eq!(outcome_detail(&result, false), None);
        assert_eq!(
            outcome_detail(&result, true).as_deref(),
            Some("Generating public/private rsa key pair.")
        );

        let skipped = ExecutionResult::skipped("ntp", TaskKind::PackageInstalled);
        assert_eq!(outcome_detail(&skipped, true), None);
    }
}
