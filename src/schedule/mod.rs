//! Per-branch, per-project cron schedule
//!
//! The schedule document lives outside the repository and maps a branch
//! (or `default`) to a project (or `default`) to a cron expression.

pub mod config;
pub mod resolver;
pub mod trigger;

pub use config::{ScheduleConfig, ScheduleError};
pub use resolver::ScheduleResolver;
pub use trigger::CronTrigger;
