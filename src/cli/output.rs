//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StepOutcome, StepResult},
    execution::ExecutionEvent,
    persistence::RunSummary,
    trigger::TriggerRule,
};
use console::Emoji;
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Lines of captured output shown under a failed step
const FAILURE_TAIL_LINES: usize = 10;

/// First eight characters of a run ID
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a step outcome, marking tolerated failures
pub fn format_outcome(outcome: StepOutcome, allow_failure: bool) -> String {
    let label = match outcome {
        StepOutcome::Succeeded => return style("OK").green().to_string(),
        StepOutcome::Failed => "FAILED",
        StepOutcome::TimedOut => "TIMED OUT",
    };
    if allow_failure {
        style(format!("{} (allowed)", label)).yellow().to_string()
    } else {
        style(label).red().to_string()
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Cancelled => WARN,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let started = summary
        .started_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(started).dim()
    );
    if let Some(trigger) = &summary.trigger {
        line.push_str(&format!(" [{}]", style(trigger).cyan()));
    }
    line
}

/// Format a finished step as one line
pub fn format_step_result(result: &StepResult) -> String {
    let icon = match (result.outcome.is_success(), result.allow_failure) {
        (true, _) => CHECK,
        (false, true) => WARN,
        (false, false) => CROSS,
    };
    let exit = result
        .exit_code
        .map(|c| format!("exit {}", c))
        .unwrap_or_else(|| "no exit code".to_string());

    format!(
        "{} {} {} ({}, {})",
        icon,
        style(&result.step_id).cyan(),
        format_outcome(result.outcome, result.allow_failure),
        exit,
        style(format_duration(Duration::from_millis(result.duration_ms))).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_steps,
            working_dir,
        } => format!(
            "{} Starting pipeline {} ({}), {} steps in {}",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            total_steps,
            style(working_dir.display()).dim()
        ),
        ExecutionEvent::StepStarted {
            index,
            step_id,
            command,
            ..
        } => format!(
            "{} [{}] {} {}",
            SPINNER,
            index + 1,
            style(step_id).cyan(),
            style(command.join(" ")).dim()
        ),
        ExecutionEvent::StepFinished { result, .. } => {
            let mut line = format_step_result(result);
            if !result.outcome.is_success() && !result.stderr.trim().is_empty() {
                line.push('\n');
                line.push_str(&format_output(&result.stderr, FAILURE_TAIL_LINES));
            }
            line
        }
        ExecutionEvent::PipelineFinished {
            run_id,
            status,
            error,
        } => {
            let status_str = match status {
                ExecutionStatus::Succeeded => style("succeeded").green().to_string(),
                other => format_status(*other),
            };
            let mut line = format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(run_id)).dim(),
                status_str
            );
            if let Some(err) = error {
                line.push_str(&format!(": {}", style(err).red()));
            }
            line
        }
    }
}

/// Keep the last `max_lines` lines of captured output
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        lines.join("\n")
    } else {
        let tail = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            tail
        )
    }
}

/// Format a trigger rule for `trigger list`
pub fn format_trigger(rule: &TriggerRule) -> String {
    let mut line = format!(
        "{} {} -> {} as {}",
        style(&rule.name).bold(),
        style(format!("/{}/", rule.branch_pattern)).cyan(),
        rule.pipeline.display(),
        style(&rule.service_identity).dim()
    );
    if let Some(description) = &rule.description {
        line.push_str(&format!(" - {}", description));
    }
    line
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
