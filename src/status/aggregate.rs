//! Reduction of stage results into one build-level result

use crate::core::{BuildResult, StageOutcome, StageResult};
use crate::execution::{CancelReason, RunReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Build-level outcome derived from every stage result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateResult {
    Success,
    /// Only stages tolerated as unstable failed
    Unstable,
    Failure,
    /// Nothing ran; no status is published
    NotBuilt,
}

impl AggregateResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateResult::Success => "SUCCESS",
            AggregateResult::Unstable => "UNSTABLE",
            AggregateResult::Failure => "FAILURE",
            AggregateResult::NotBuilt => "NOT_BUILT",
        }
    }

    pub fn is_publishable(&self) -> bool {
        *self != AggregateResult::NotBuilt
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AggregateResult> for BuildResult {
    fn from(result: AggregateResult) -> Self {
        match result {
            AggregateResult::Success => BuildResult::Success,
            AggregateResult::Unstable => BuildResult::Unstable,
            AggregateResult::Failure => BuildResult::Failure,
            AggregateResult::NotBuilt => BuildResult::NotBuilt,
        }
    }
}

/// Reduce stage results.
///
/// A failure in a stage tolerated as unstable yields `Unstable`; any other
/// failure yields `Failure`. A group that failed only through a nested stage
/// is not counted on its own.
pub fn aggregate(results: &HashMap<String, StageResult>) -> AggregateResult {
    let mut ran = false;
    let mut tolerated_failure = false;

    for result in results.values().filter(|r| r.counts_toward_aggregate()) {
        match result.outcome {
            StageOutcome::Failure if !result.unstable_on_failure => return AggregateResult::Failure,
            StageOutcome::Failure => {
                tolerated_failure = true;
                ran = true;
            }
            StageOutcome::Success => ran = true,
            StageOutcome::Skipped => {}
        }
    }

    match (ran, tolerated_failure) {
        (_, true) => AggregateResult::Unstable,
        (true, false) => AggregateResult::Success,
        (false, false) => AggregateResult::NotBuilt,
    }
}

/// Reduce a whole run.
///
/// Stage outcomes alone can look green after a timeout, because stages that
/// never got to start are only skipped. A timed-out run is a `Failure`, and
/// an aborted run that got as far as running something is too.
pub fn aggregate_report(report: &RunReport) -> AggregateResult {
    let stages = aggregate(&report.results);
    match report.cancelled {
        Some(CancelReason::Timeout) => AggregateResult::Failure,
        Some(CancelReason::Aborted) if stages.is_publishable() => AggregateResult::Failure,
        _ => stages,
    }
}

/// Result stored in build history; an aborted run is recorded as aborted
pub fn build_result(report: &RunReport) -> BuildResult {
    match report.cancelled {
        Some(CancelReason::Aborted) => BuildResult::Aborted,
        _ => aggregate_report(report).into(),
    }
}
