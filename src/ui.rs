use colored::Colorize;

use crate::engine::{PassSummary, StageOutcome};

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

// ============================================================================
// Pass Summary
// ============================================================================

/// One line per stage, e.g. `uninstalls: 2 done, 1 retry`.
pub fn stage_line(outcome: &StageOutcome) -> String {
    if let Some(reason) = &outcome.skipped {
        return format!("skipped ({reason})");
    }
    if let Some(err) = &outcome.error {
        return format!("error: {err}");
    }
    let Some(report) = &outcome.report else {
        return String::new();
    };
    if report.is_idle() {
        return "nothing to do".to_string();
    }

    let mut parts = Vec::new();
    if !report.succeeded.is_empty() {
        parts.push(format!("{} done", report.succeeded.len()));
    }
    if !report.failed.is_empty() {
        parts.push(format!("{} failed", report.failed.len()));
    }
    if !report.rearmed.is_empty() {
        parts.push(format!("{} retry", report.rearmed.len()));
    }
    if !report.quarantined.is_empty() {
        parts.push(format!("{} given up", report.quarantined.len()));
    }
    if !report.force_deleted.is_empty() {
        parts.push(format!("{} force deleted", report.force_deleted.len()));
    }
    if parts.is_empty() {
        parts.push("ok".to_string());
    }
    parts.join(", ")
}

/// Print the result of a pass.
pub fn pass_summary(summary: &PassSummary) {
    if summary.locked_out {
        warn("Another reconciliation pass is running; nothing done");
        return;
    }

    header("Reconciliation");
    if summary.migrated_markers > 0 {
        kv("legacy", &format!("{} marker(s) migrated", summary.migrated_markers));
    }
    for outcome in &summary.stages {
        let line = stage_line(outcome);
        let line = if outcome.error.is_some() {
            line.red().to_string()
        } else if outcome.report.as_ref().is_some_and(|r| !r.failed.is_empty()) {
            line.yellow().to_string()
        } else {
            line
        };
        kv(&outcome.stage.to_string(), &line);
    }

    println!();
    if summary.is_success() {
        success(&format!("{} change(s) applied", summary.total_changes()));
    } else {
        warn("Some operations failed; see the log above");
    }
}

// ============================================================================
// Tests
// ============================================================================
