//! cigate - CI pipeline orchestration: gated stages on labelled agents,
//! one commit status per build

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod schedule;
pub mod status;

// Re-export commonly used types
pub use agent::{AgentError, AgentPool, CommandRunner, ShellRunner};
pub use core::{BuildRecord, Condition, ExecutionStatus, Pipeline, RunContext, Stage, StageResult};
pub use execution::{plan, ExecutionEngine, ExecutionEvent, ExecutionPlan, RunReport};
pub use schedule::{CronTrigger, ScheduleResolver};
pub use status::{aggregate, aggregate_report, AggregateResult, StatusReporter};
