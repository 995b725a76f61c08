//! Pipeline execution engine

pub mod cancel;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod reports;

pub use cancel::{CancelHandle, CancelReason, CancelSignal};
pub use engine::{AbortHandle, EventHandler, ExecutionEngine, ExecutionEvent, RunReport};
pub use executor::StageExecutor;
pub use planner::{plan, Decision, ExecutionPlan, PlannedBody, PlannedStage};
