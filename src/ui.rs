use colored::Colorize;
use converge::{RunSummary, TaskStatus};
use similar::{ChangeTag, TextDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

/// Colored one-character marker for a task outcome
pub fn status_symbol(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Skipped => "○".dimmed(),
        TaskStatus::Changed => "✓".green(),
        TaskStatus::Failed => "✗".red(),
    }
}

// ============================================================================
// Diffs
// ============================================================================

/// Changed lines between two texts, without the unchanged context
pub fn diff_lines(current: &str, desired: &str) -> Vec<(ChangeTag, String)> {
    TextDiff::from_lines(current, desired)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .map(|change| (change.tag(), change.to_string_lossy().trim_end_matches('\n').to_string()))
        .collect()
}

/// Print a line diff between the current and desired content of a file
pub fn print_diff(current: &str, desired: &str) {
    let changes = diff_lines(current, desired);
    if changes.is_empty() {
        println!("    {}", "(no content changes)".dimmed());
        return;
    }

    for (tag, line) in changes {
        match tag {
            ChangeTag::Delete => println!("    {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("    {}", format!("+ {line}").green()),
            ChangeTag::Equal => {}
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// One-line tally of a run, e.g. "2 changed, 3 unchanged"
pub fn summary_line(summary: &RunSummary) -> String {
    let mut parts = vec![
        format!("{} changed", summary.changed),
        format!("{} unchanged", summary.skipped),
    ];
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.not_run > 0 {
        parts.push(format!("{} not run", summary.not_run));
    }
    parts.join(", ")
}

/// Print final summary
pub fn print_summary(summary: &RunSummary) {
    println!();
    if summary.failed == 0 {
        println!("  {} {}", "✓".green().bold(), summary_line(summary));
    } else {
        println!("  {} {}", "✗".red().bold(), summary_line(summary));
    }
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
