//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StageOutcome},
    execution::{Decision, ExecutionEvent, ExecutionPlan, PlannedStage, RunReport},
    persistence::BuildSummary,
    status::AggregateResult,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a stage outcome for display
pub fn format_outcome(outcome: StageOutcome) -> String {
    match outcome {
        StageOutcome::Success => style("SUCCESS").green().to_string(),
        StageOutcome::Failure => style("FAILURE").red().to_string(),
        StageOutcome::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format the aggregate build result for display
pub fn format_aggregate(result: AggregateResult) -> String {
    match result {
        AggregateResult::Success => style(result).green().to_string(),
        AggregateResult::Unstable => style(result).yellow().to_string(),
        AggregateResult::Failure => style(result).red().to_string(),
        AggregateResult::NotBuilt => style(result).dim().to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            stage_count,
        } => format!(
            "{} Starting pipeline {} ({}, {} stages)",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim(),
            stage_count
        ),
        ExecutionEvent::StageStarted { stage, agent } => {
            format!("{} {} on {}", SPINNER, style(stage).cyan(), style(agent).dim())
        }
        ExecutionEvent::StageSkipped { stage, reason } => {
            format!("{} {} ({})", SKIP, style(stage).dim(), style(reason).dim())
        }
        ExecutionEvent::StageFinished {
            stage,
            outcome,
            duration,
            cause,
        } => match (outcome, cause) {
            (StageOutcome::Failure, Some(cause)) => format!(
                "{} {}: {} [{}]",
                CROSS,
                style(stage).red(),
                style(cause).dim(),
                format_duration(*duration)
            ),
            (StageOutcome::Skipped, _) => format!("{} {}", SKIP, style(stage).dim()),
            _ => format!(
                "{} {} [{}]",
                CHECK,
                style(stage).green(),
                format_duration(*duration)
            ),
        },
        ExecutionEvent::RunCancelled { reason } => {
            format!("{} Run cancelled: {}", WARN, style(format!("{:?}", reason)).yellow())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Render the plan as an indented tree
pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut lines = vec![format!(
        "{} Plan for {} (timeout {})",
        INFO,
        style(&plan.pipeline_name).bold(),
        format_duration(plan.timeout)
    )];

    let mut stack: Vec<(&PlannedStage, usize)> = plan.stages.iter().rev().map(|s| (s, 1)).collect();
    while let Some((stage, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        let agent = stage
            .agent
            .as_deref()
            .map(|label| format!(" @{}", label))
            .unwrap_or_default();
        let line = match &stage.decision {
            Decision::Run => format!("{}{} {}{}", indent, CHECK, style(&stage.name).bold(), style(agent).dim()),
            Decision::Skip(reason) => format!(
                "{}{} {} ({})",
                indent,
                SKIP,
                style(&stage.name).dim(),
                style(reason).dim()
            ),
        };
        lines.push(line);
        stack.extend(stage.children().iter().rev().map(|c| (c, depth + 1)));
    }

    lines.join("\n")
}

/// Per-stage lines of a finished run, in plan order
pub fn format_report(plan: &ExecutionPlan, report: &RunReport) -> String {
    plan.all_stages()
        .iter()
        .filter_map(|stage| report.result(&stage.name))
        .map(|result| {
            let mut line = format!(
                "  {:<30} {} {}",
                result.name,
                format_outcome(result.outcome),
                style(format_duration(result.duration)).dim()
            );
            if let Some(tests) = &result.tests {
                let counts = format!(
                    " tests: {} failures: {} errors: {}",
                    tests.tests, tests.failures, tests.errors
                );
                if tests.has_failures() {
                    line.push_str(&style(counts).red().to_string());
                } else {
                    line.push_str(&counts);
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a build summary for display
pub fn format_build_summary(summary: &BuildSummary) -> String {
    let result = summary
        .result
        .map(|r| r.to_string())
        .unwrap_or_else(|| "RUNNING".to_string());
    let icon = match result.as_str() {
        "SUCCESS" => CHECK,
        "FAILURE" => CROSS,
        "RUNNING" => SPINNER,
        _ => INFO,
    };

    format!(
        "{} #{} {} - {} - {} ({} ok, {} failed, {} skipped) - {}",
        icon,
        summary.number,
        style(&summary.job_name).bold(),
        style(&summary.branch).cyan(),
        result,
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        style(summary.skipped).dim(),
        style(summary.started_at.to_rfc3339()).dim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(18_000)), "5h 0m 0s");
    }

    #[test]
    fn test_format_report_shows_test_counts() {
        use crate::core::{ExecutionStatus, Pipeline, RunContext, Stage, StageResult, TestSummary};
        use crate::execution::plan;
        use std::collections::HashMap;

        let pipeline = Pipeline::new("io-engine", vec![Stage::steps("unit", ["./scripts/cargo-test.sh"])]);
        let plan = plan(&pipeline, &RunContext::builder("develop", "io-engine/develop").build());

        let mut unit = StageResult::skipped("unit", "", false);
        unit.outcome = StageOutcome::Success;
        unit.skip_reason = None;
        unit.tests = Some(TestSummary {
            tests: 12,
            failures: 1,
            errors: 0,
            skipped: 0,
        });
        let report = RunReport {
            execution_id: uuid::Uuid::new_v4(),
            pipeline_name: "io-engine".to_string(),
            status: ExecutionStatus::Completed,
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
            cancelled: None,
            results: HashMap::from([("unit".to_string(), unit)]),
        };

        let text = format_report(&plan, &report);
        assert!(text.contains("unit"));
        assert!(text.contains("tests: 12 failures: 1 errors: 0"));
    }
}
