//! Test: global timeout and abort cancel the run

use crate::helpers::*;
use cigate::agent::{AgentPool, WorkerSpec};
use cigate::core::{BuildCause, BuildResult, ExecutionStatus, FailureCause, Pipeline, Stage, StageOutcome};
use cigate::execution::{plan, CancelReason, ExecutionEngine};
use cigate::status::{aggregate, aggregate_report, build_result, AggregateResult};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_hanging_stage_fails_exactly_at_timeout() {
    let pipeline = Pipeline::new(
        "hang",
        vec![
            Stage::steps("e2e", ["hang"]).post_always("cleanup"),
            Stage::steps("publish", ["./scripts/release.sh"]),
        ],
    )
    .with_timeout(Duration::from_secs(10));

    let start = Instant::now();
    let (report, runner) = run(&pipeline).await;

    assert_eq!(start.elapsed(), Duration::from_secs(10));

    let e2e = report.result("e2e").unwrap();
    assert_eq!(e2e.outcome, StageOutcome::Failure);
    assert_eq!(e2e.cause, Some(FailureCause::Timeout));
    assert!(e2e.was_cancelled());
    assert_eq!(e2e.duration, Duration::from_secs(10));

    // cleanup ran after the command was cancelled
    assert_eq!(runner.ran(), vec!["hang", "cleanup"]);

    assert_outcome(&report, "publish", StageOutcome::Skipped);
    assert_skip_reason(&report, "publish", "global timeout");
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(report.cancelled, Some(CancelReason::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_waiting_for_agent_is_cancelled() {
    let pipeline = Pipeline::new(
        "starved",
        vec![Stage::parallel(
            "tests",
            vec![
                Stage::steps("holder", ["hang"]).on_agent("nixos"),
                Stage::steps("waiter", ["pytest"]).on_agent("nixos"),
            ],
        )],
    )
    .with_timeout(Duration::from_secs(60));
    let pool = AgentPool::new(vec![WorkerSpec::new("nix-1", &["nixos"], 1)]);

    let (report, runner) = run_with(&pipeline, &context("develop", BuildCause::ScmChange), pool).await;

    assert_cause(&report, "holder", FailureCause::Timeout);
    assert_outcome(&report, "waiter", StageOutcome::Skipped);
    assert_eq!(runner.ran(), vec!["hang"]);
}

#[tokio::test(start_paused = true)]
async fn test_abort_cancels_running_stage() {
    let pipeline = Pipeline::new(
        "abort",
        vec![
            Stage::steps("build", ["hang"]).post_always("docker logout"),
            Stage::steps("push", ["docker push"]),
        ],
    );
    let runner = ScriptedRunner::new();
    let engine = ExecutionEngine::new(runner.clone(), AgentPool::new(vec![]));
    let plan = plan(&pipeline, &context("develop", BuildCause::User));

    let abort = engine.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        abort.abort();
    });

    let report = engine.execute(&plan).await;

    assert_eq!(report.status, ExecutionStatus::Cancelled);
    assert_cause(&report, "build", FailureCause::Aborted);
    assert_outcome(&report, "push", StageOutcome::Skipped);
    assert_eq!(runner.ran(), vec!["hang", "docker logout"]);
    assert_eq!(build_result(&report), BuildResult::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_with_only_green_stages_is_a_failure() {
    let pipeline = Pipeline::new(
        "green but late",
        vec![Stage::parallel(
            "checks",
            vec![
                Stage::steps("lint", ["./scripts/rust-linter.sh"]),
                Stage::steps("holder", ["sleep 1000"])
                    .on_agent("nixos")
                    .post_always("sleep 120000"),
                Stage::steps("unit", ["./scripts/cargo-test.sh"]).on_agent("nixos"),
            ],
        )],
    )
    .with_timeout(Duration::from_secs(60));
    let pool = AgentPool::new(vec![WorkerSpec::new("nix-1", &["nixos"], 1)]);

    let (report, runner) = run_with(&pipeline, &context("develop", BuildCause::ScmChange), pool).await;

    assert_outcome(&report, "lint", StageOutcome::Success);
    assert_outcome(&report, "holder", StageOutcome::Success);
    assert_outcome(&report, "unit", StageOutcome::Skipped);
    assert_skip_reason(&report, "unit", "global timeout");
    assert!(!runner.ran().contains(&"./scripts/cargo-test.sh".to_string()));

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(aggregate(&report.results), AggregateResult::Success);
    assert_eq!(aggregate_report(&report), AggregateResult::Failure);
    assert_eq!(build_result(&report), BuildResult::Failure);
}
