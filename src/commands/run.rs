//! `hostprov run` - apply a task file

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use converge::{
    ApplyContext, ExecuteOptions, ExecutionPlan, NoProgress, PlanStatus, ProgressCallback,
    RunReport, RunSummary, ServiceManager, SystemRunner, Target, Task, execute_targets,
    filter_tasks, validate_all,
};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::RunArgs;
use crate::progress::TerminalProgress;
use crate::taskfile::TaskFile;
use crate::ui;

/// Load, validate and filter a task file. Any malformed task fails the whole
/// file before anything runs.
pub fn load_tasks(path: &Path, only: Option<&str>) -> Result<Vec<Task>> {
    let file = TaskFile::load(path)?;
    let tasks = validate_all(&file.task)
        .with_context(|| format!("Invalid task file: {}", path.display()))?;
    Ok(filter_tasks(tasks, only))
}

/// Options for a run, with command-line flags taking precedence over settings
pub fn execute_options(
    ctx: &Context,
    continue_on_failure: bool,
    jobs: Option<usize>,
) -> ExecuteOptions {
    ExecuteOptions {
        stop_on_failure: ctx.settings.stop_on_failure && !continue_on_failure,
        jobs: jobs.unwrap_or(ctx.settings.jobs).max(1),
    }
}

pub fn run(ctx: &Context, args: RunArgs) -> Result<bool> {
    let tasks = load_tasks(&args.taskfile, args.only.as_deref())?;
    if tasks.is_empty() {
        ui::info("No tasks to run");
        return Ok(true);
    }

    let services: ServiceManager = args
        .service_manager
        .map_or(ctx.settings.service_manager, Into::into);
    let opts = execute_options(ctx, args.continue_on_failure, args.jobs);
    let runner = SystemRunner;

    let roots = unique_roots(&args.roots);
    let targets: Vec<Target> = roots
        .iter()
        .map(|root| Target {
            label: root.display().to_string(),
            ctx: ApplyContext::new(&runner)
                .with_root(root)
                .with_service_manager(services),
            tasks: tasks.clone(),
        })
        .collect();

    if !ctx.quiet {
        ui::header(&format!(
            "{} task(s) from {}",
            tasks.len(),
            args.taskfile.display()
        ));
    }

    let pending = show_pending(ctx, &targets);
    if pending == 0 {
        ui::success("Already up to date");
        return Ok(true);
    }

    if !args.yes && !super::confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(false);
    }

    let reports = if targets.len() == 1 {
        let mut progress = TerminalProgress::new(ctx.quiet, ctx.verbose > 0);
        execute_targets(&targets, &opts, &mut progress)?
    } else {
        log::info!("Applying to {} roots on {} job(s)", targets.len(), opts.jobs);
        let reports = execute_targets(&targets, &opts, &mut NoProgress)?;
        for (label, report) in &reports {
            if !ctx.quiet {
                ui::section(label);
            }
            replay(ctx, report);
        }
        reports
    };

    Ok(finish(ctx, &reports))
}

/// Print what would change on each target; returns the number of pending tasks
fn show_pending(ctx: &Context, targets: &[Target]) -> usize {
    let mut total = 0;
    for target in targets {
        let plan = ExecutionPlan::build(&target.tasks, &target.ctx, false);
        total += plan.pending() + usize::from(plan.has_errors());
        if ctx.quiet {
            continue;
        }
        let label = if target.label == "/" {
            String::new()
        } else {
            format!(" on {}", target.label)
        };
        ui::info(&format!(
            "{} of {} task(s) would run{}",
            plan.pending(),
            plan.entries.len(),
            label
        ));
        for entry in plan
            .entries
            .iter()
            .filter(|e| e.status != PlanStatus::Satisfied)
        {
            ui::dim(&format!("{} ({})", entry.task_name, entry.target));
        }
    }
    total
}

fn replay(ctx: &Context, report: &RunReport) {
    let mut progress = TerminalProgress::new(ctx.quiet, ctx.verbose > 0);
    for result in &report.results {
        progress.on_task_complete(result);
    }
    if !report.not_run.is_empty() {
        progress.on_abort(&report.not_run);
    }
}

/// Print the combined summary; true when every target succeeded
pub fn finish(ctx: &Context, reports: &[(String, RunReport)]) -> bool {
    let mut summary = RunSummary::default();
    for (label, report) in reports {
        summary.merge(&report.summary());
        if let Some(failure) = report.first_failure() {
            log::debug!("{}: first failure was '{}'", label, failure.task_name);
        }
    }
    if !ctx.quiet || summary.failed > 0 {
        ui::print_summary(&summary);
    }
    reports.iter().all(|(_, report)| report.is_success())
}

/// Roots given on the command line, deduplicated in order
pub fn unique_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = Vec::new();
    for root in roots {
        if !seen.contains(root) {
            seen.push(root.clone());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::fs;
    use tempfile::TempDir;

    fn context(settings: Settings) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            settings,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let ctx = context(Settings::default());
        let opts = execute_options(&ctx, false, None);
        assert!(opts.stop_on_failure);
        assert_eq!(opts.jobs, 4);

        let opts = execute_options(&ctx, true, Some(0));
        assert!(!opts.stop_on_failure);
        assert_eq!(opts.jobs, 1);

        let ctx = context(Settings {
            stop_on_failure: false,
            ..Settings::default()
        });
        assert!(!execute_options(&ctx, false, None).stop_on_failure);
    }

    #[test]
    fn test_load_tasks_rejects_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.toml");
        fs::write(
            &path,
            r#"
[[task]]
name = "motd"
kind = "file_content"
path = "/etc/motd"
content = "hi\n"

[[task]]
name = "relative"
kind = "file_content"
path = "etc/issue"
content = "x\n"
"#,
        )
        .unwrap();

        let err = load_tasks(&path, None).unwrap_err();
        let root = err.root_cause().to_string();
        assert!(root.contains("relative"), "{root}");
    }

    #[test]
    fn test_load_tasks_filters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.toml");
        fs::write(
            &path,
            r#"
[[task]]
name = "motd"
kind = "file_content"
path = "/etc/motd"
content = "hi\n"

[[task]]
name = "ntp"
kind = "package_installed"
package = "ntp"
"#,
        )
        .unwrap();

        let tasks = load_tasks(&path, Some("package_installed")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "ntp");
    }

    #[test]
    fn test_unique_roots() {
        let roots = vec![
            PathBuf::from("/srv/a"),
            PathBuf::from("/srv/b"),
            PathBuf::from("/srv/a"),
        ];
        assert_eq!(
            unique_roots(&roots),
            vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]
        );
    }

    #[test]
    fn test_finish_reports_failure() {
        use converge::{Error, ExecutionResult, TaskKind};

        let ctx = context(Settings::default());
        let ok = RunReport {
            results: vec![ExecutionResult::skipped("motd", TaskKind::FileContent)],
            not_run: Vec::new(),
        };
        let failed = RunReport {
            results: vec![ExecutionResult::failed(
                "ntp",
                TaskKind::PackageInstalled,
                &Error::action("boom"),
            )],
            not_run: vec!["ntp running".into()],
        };

        assert!(finish(&ctx, &[("/".to_string(), ok.clone())]));
        assert!(!finish(&ctx, &[("/".to_string(), ok), ("/srv/b".to_string(), failed)]));
    }
}
