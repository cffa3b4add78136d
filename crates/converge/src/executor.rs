//! Execution engine - runs task sequences in order and reports per task

use crate::action;
use crate::check;
use crate::context::{ApplyContext, ProgressCallback};
use crate::error::{Error, Result};
use crate::task::{Task, TaskSpec, validate_all};
use crate::types::{ExecuteOptions, ExecutionResult, RunReport};
use rayon::prelude::*;

/// Execute `tasks` strictly in order against one target.
///
/// Idempotent tasks whose desired state already holds are skipped. A failed
/// task is recorded with its error; with `stop_on_failure` the remaining
/// tasks are listed in [`RunReport::not_run`] instead of being executed.
pub fn execute<P: ProgressCallback>(
    tasks: &[Task],
    ctx: &ApplyContext,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> RunReport {
    let mut report = RunReport::default();

    for (index, task) in tasks.iter().enumerate() {
        progress.on_task_start(index, tasks.len(), task);
        let result = run_task(task, ctx);
        progress.on_task_complete(&result);
        let failed = result.is_failed();
        report.results.push(result);

        if failed && opts.stop_on_failure {
            report.not_run = tasks[index + 1..].iter().map(|t| t.name.clone()).collect();
            if !report.not_run.is_empty() {
                log::warn!(
                    "Stopping after failed task '{}', {} task(s) not run",
                    task.name,
                    report.not_run.len()
                );
                progress.on_abort(&report.not_run);
            }
            break;
        }
    }

    report
}

/// Validate every specification, then execute.
///
/// A configuration error aborts before any task has run.
pub fn execute_specs<P: ProgressCallback>(
    specs: &[TaskSpec],
    ctx: &ApplyContext,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<RunReport> {
    let tasks = validate_all(specs)?;
    Ok(execute(&tasks, ctx, opts, progress))
}

/// Check and, when needed, apply a single task
fn run_task(task: &Task, ctx: &ApplyContext) -> ExecutionResult {
    let kind = task.kind();

    if task.idempotent {
        match check::is_satisfied(task, ctx) {
            Ok(true) => return ExecutionResult::skipped(&task.name, kind),
            Ok(false) => {}
            Err(e) => {
                log::debug!("Check for '{}' failed: {}", task.name, e);
                return ExecutionResult::failed(&task.name, kind, &e);
            }
        }
    }

    match action::perform(task, ctx) {
        Ok(output) => ExecutionResult::changed(&task.name, kind, output),
        Err(e) => {
            log::debug!("Task '{}' failed: {}", task.name, e);
            ExecutionResult::failed(&task.name, kind, &e)
        }
    }
}

/// One target with its own context and task sequence
pub struct Target<'a> {
    /// Name used in reports, e.g. the root path or host name
    pub label: String,
    pub ctx: ApplyContext<'a>,
    pub tasks: Vec<Task>,
}

/// Execute several independent targets.
///
/// Each target's sequence runs in order; targets run in parallel on up to
/// `opts.jobs` threads. Reports come back in target order and are passed to
/// `progress` once all targets finished.
pub fn execute_targets<P: ProgressCallback>(
    targets: &[Target],
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<Vec<(String, RunReport)>> {
    if opts.jobs <= 1 || targets.len() <= 1 {
        return Ok(targets
            .iter()
            .map(|t| (t.label.clone(), execute(&t.tasks, &t.ctx, opts, progress)))
            .collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| Error::action(format!("Failed to create thread pool: {e}")))?;

    let reports: Vec<(String, RunReport)> = pool.install(|| {
        targets
            .par_iter()
            .map(|t| {
                let report = execute(&t.tasks, &t.ctx, opts, &mut crate::context::NoProgress);
                (t.label.clone(), report)
            })
            .collect()
    });

    // Report results to progress callback
    for (_, report) in &reports {
        for result in &report.results {
            progress.on_task_complete(result);
        }
        if !report.not_run.is_empty() {
            progress.on_abort(&report.not_run);
        }
    }

    Ok(reports)
}
