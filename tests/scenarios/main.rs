//! Scenario-based tests for cigate

mod helpers;

mod branch_gating;
mod parallel_groups;
mod sequential_groups;
mod status_publication;
mod timeout;
