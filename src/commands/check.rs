//! `hostprov check` - report what a run would change

use anyhow::Result;
use colored::Colorize;
use converge::{ApplyContext, ExecutionPlan, PlanEntry, PlanStatus, SystemRunner};

use crate::Context;
use crate::cli::CheckArgs;
use crate::ui;

use super::run::load_tasks;

pub fn run(ctx: &Context, args: CheckArgs) -> Result<bool> {
    let tasks = load_tasks(&args.taskfile, args.only.as_deref())?;

    let runner = SystemRunner;
    let apply_ctx = ApplyContext::new(&runner)
        .with_root(&args.root)
        .with_service_manager(ctx.settings.service_manager);
    let plan = ExecutionPlan::build(&tasks, &apply_ctx, args.diff);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(!plan.has_errors());
    }

    ui::header(&format!("Checking {}", args.taskfile.display()));
    if args.root.as_os_str() != "/" {
        ui::kv("root", &args.root.display().to_string());
    }
    println!();

    for entry in &plan.entries {
        print_entry(entry, args.diff);
    }

    println!();
    if plan.is_empty() {
        ui::info("No tasks matched");
    } else if plan.pending() == 0 && !plan.has_errors() {
        ui::success(&format!("All {} task(s) satisfied", plan.entries.len()));
    } else {
        ui::info(&format!(
            "{} of {} task(s) would run",
            plan.pending(),
            plan.entries.len()
        ));
    }

    Ok(!plan.has_errors())
}

fn status_marker(status: &PlanStatus) -> colored::ColoredString {
    match status {
        PlanStatus::Satisfied => "○".dimmed(),
        PlanStatus::Pending => "~".yellow(),
        PlanStatus::Always => "↻".blue(),
        PlanStatus::Error(_) => "✗".red(),
    }
}

fn print_entry(entry: &PlanEntry, show_diff: bool) {
    println!(
        "  {} {} {}",
        status_marker(&entry.status),
        entry.task_name,
        format!("({} {})", entry.kind, entry.target).dimmed()
    );

    match &entry.status {
        PlanStatus::Error(message) => println!("      {}", message.red()),
        PlanStatus::Always => println!("      {}", "runs every time".dimmed()),
        _ => {}
    }

    if show_diff && let Some(preview) = &entry.preview {
        println!("    {}", format!("--- {}", preview.path.display()).dimmed());
        ui::print_diff(&preview.current, &preview.desired);
    }
}
