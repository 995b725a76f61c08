//! Execution state models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Pipeline ran to the end without a blocking failure
    Completed,
    /// A stage failed or the global timeout expired
    Failed,
    /// Pipeline was aborted
    Cancelled,
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    Success,
    Failure,
    Skipped,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => write!(f, "SUCCESS"),
            StageOutcome::Failure => write!(f, "FAILURE"),
            StageOutcome::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Why a stage ended in `Failure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// An external command exited non-zero or could not be spawned
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },
    /// The global timeout expired while the stage was running
    Timeout,
    /// The run was aborted while the stage was running
    Aborted,
    /// A post-action failed after the body concluded
    PostAction { command: String },
    /// No worker agent could be allocated
    Agent { message: String },
    /// A nested stage failed
    ChildFailed { stage: String },
}

impl FailureCause {
    /// Whether this failure was forced by cancellation rather than the stage itself
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FailureCause::Timeout | FailureCause::Aborted)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::CommandFailed {
                command,
                exit_code: Some(code),
            } => write!(f, "`{}` exited with code {}", command, code),
            FailureCause::CommandFailed {
                command,
                exit_code: None,
            } => write!(f, "`{}` did not exit normally", command),
            FailureCause::Timeout => write!(f, "cancelled by global timeout"),
            FailureCause::Aborted => write!(f, "cancelled by abort"),
            FailureCause::PostAction { command } => write!(f, "post-action `{}` failed", command),
            FailureCause::Agent { message } => write!(f, "agent allocation failed: {}", message),
            FailureCause::ChildFailed { stage } => write!(f, "nested stage '{}' failed", stage),
        }
    }
}

/// Test counts ingested from JUnit-style reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub tests: u64,
    pub failures: u64,
    pub errors: u64,
    pub skipped: u64,
}

impl TestSummary {
    pub fn merge(&mut self, other: TestSummary) {
        self.tests += other.tests;
        self.failures += other.failures;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }

    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.errors > 0
    }
}

/// Result of a finished or skipped stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name
    pub name: String,

    pub outcome: StageOutcome,

    /// Wall-clock time from body start to the end of its post-actions
    pub duration: Duration,

    /// Report files matched by the stage's report globs
    pub reports: Vec<PathBuf>,

    /// Set when `outcome` is `Failure`
    pub cause: Option<FailureCause>,

    /// Set when `outcome` is `Skipped`
    pub skip_reason: Option<String>,

    /// Failure downgrades the build to unstable instead of failing it
    pub unstable_on_failure: bool,

    /// Whether the stage is a sequential or parallel group
    pub is_group: bool,

    /// Agent the body ran on
    pub agent: Option<String>,

    pub tests: Option<TestSummary>,
}

impl StageResult {
    /// A stage that never started
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>, is_group: bool) -> Self {
        Self {
            name: name.into(),
            outcome: StageOutcome::Skipped,
            duration: Duration::ZERO,
            reports: Vec::new(),
            cause: None,
            skip_reason: Some(reason.into()),
            unstable_on_failure: false,
            is_group,
            agent: None,
            tests: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == StageOutcome::Failure
    }

    /// Whether the timeout or an abort forced this stage to fail
    pub fn was_cancelled(&self) -> bool {
        self.cause.as_ref().is_some_and(FailureCause::is_cancellation)
    }

    /// Whether this result carries its own signal for the build aggregate.
    ///
    /// A group that failed only because a nested stage failed is already
    /// represented by that nested stage's result.
    pub fn counts_toward_aggregate(&self) -> bool {
        !(self.is_group && matches!(self.cause, Some(FailureCause::ChildFailed { .. })))
    }
}

/// Build-level result as kept by the build-history provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    NotBuilt,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Failure => "FAILURE",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::NotBuilt => "NOT_BUILT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(BuildResult::Success),
            "FAILURE" => Some(BuildResult::Failure),
            "UNSTABLE" => Some(BuildResult::Unstable),
            "ABORTED" => Some(BuildResult::Aborted),
            "NOT_BUILT" => Some(BuildResult::NotBuilt),
            _ => None,
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
