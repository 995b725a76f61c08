//! Core domain models for the pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, stages, gating conditions and build history.

pub mod condition;
pub mod config;
pub mod context;
pub mod credentials;
pub mod history;
pub mod pipeline;
pub mod stage;
pub mod state;

pub use condition::{evaluate, Condition};
pub use context::{BuildCause, ParamValue, ParameterDecl, RunContext};
pub use history::{last_non_aborted, BuildRecord};
pub use pipeline::*;
pub use stage::*;
pub use state::*;
