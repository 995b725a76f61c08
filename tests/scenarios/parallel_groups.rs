//! Test: parallel groups and agent allocation

use crate::helpers::*;
use cigate::agent::{AgentPool, WorkerSpec};
use cigate::core::{BuildCause, FailureCause, Pipeline, Stage, StageOutcome};
use cigate::status::{aggregate, AggregateResult};
use std::time::Duration;
use tokio::time::Instant;

fn nixos_pool(executors: usize) -> AgentPool {
    AgentPool::new(vec![WorkerSpec::new("nix-1", &["nixos"], executors)])
}

#[tokio::test(start_paused = true)]
async fn test_failing_branch_does_not_stop_siblings() {
    let pipeline = Pipeline::new(
        "tests",
        vec![Stage::parallel(
            "tests",
            vec![
                Stage::steps("rust unit", ["sleep 100"]),
                Stage::steps("python", ["fail"]),
                Stage::steps("bdd", ["sleep 200"]),
            ],
        )],
    );

    let (report, runner) = run(&pipeline).await;

    assert_outcome(&report, "rust unit", StageOutcome::Success);
    assert_outcome(&report, "python", StageOutcome::Failure);
    assert_outcome(&report, "bdd", StageOutcome::Success);
    assert_outcome(&report, "tests", StageOutcome::Failure);
    assert_cause(
        &report,
        "tests",
        FailureCause::ChildFailed {
            stage: "python".to_string(),
        },
    );
    assert_eq!(runner.ran().len(), 3);
    assert_eq!(aggregate(&report.results), AggregateResult::Failure);
}

#[tokio::test(start_paused = true)]
async fn test_branches_run_concurrently() {
    let pipeline = Pipeline::new(
        "concurrent",
        vec![Stage::parallel(
            "tests",
            vec![
                Stage::steps("a", ["sleep 1000"]).on_agent("nixos"),
                Stage::steps("b", ["sleep 1000"]).on_agent("nixos"),
            ],
        )],
    );
    let ctx = context("feature/x", BuildCause::ScmChange);

    let start = Instant::now();
    let (report, _) = run_with(&pipeline, &ctx, nixos_pool(2)).await;

    assert_eq!(start.elapsed(), Duration::from_millis(1000));
    assert_outcome(&report, "tests", StageOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn test_busy_agent_makes_branches_wait() {
    let pipeline = Pipeline::new(
        "one executor",
        vec![Stage::parallel(
            "tests",
            vec![
                Stage::steps("a", ["sleep 1000"]).on_agent("nixos"),
                Stage::steps("b", ["sleep 1000"]).on_agent("nixos"),
            ],
        )],
    );
    let ctx = context("feature/x", BuildCause::ScmChange);

    let start = Instant::now();
    let (report, _) = run_with(&pipeline, &ctx, nixos_pool(1)).await;

    assert_eq!(start.elapsed(), Duration::from_millis(2000));
    assert_outcome(&report, "a", StageOutcome::Success);
    assert_outcome(&report, "b", StageOutcome::Success);
}

#[tokio::test]
async fn test_nested_stages_inherit_allocation() {
    let pipeline = Pipeline::new(
        "inherit",
        vec![
            Stage::steps("checkout", ["git checkout"]),
            Stage::sequential(
                "build",
                vec![
                    Stage::steps("compile", ["cargo build"]),
                    Stage::steps("package", ["nix-build"]),
                ],
            )
            .on_agent("nixos"),
        ],
    );
    let ctx = context("feature/x", BuildCause::ScmChange);

    let (report, runner) = run_with(&pipeline, &ctx, nixos_pool(1)).await;

    assert_eq!(runner.agent_of("git checkout").as_deref(), Some("controller"));
    assert_eq!(runner.agent_of("cargo build").as_deref(), Some("nix-1"));
    assert_eq!(runner.agent_of("nix-build").as_deref(), Some("nix-1"));
    assert_eq!(report.result("package").unwrap().agent.as_deref(), Some("nix-1"));
}

#[tokio::test]
async fn test_unknown_label_fails_fast() {
    let pipeline = Pipeline::new(
        "labels",
        vec![Stage::steps("windows build", ["msbuild"]).on_agent("windows")],
    );
    let ctx = context("feature/x", BuildCause::ScmChange);

    let (report, runner) = run_with(&pipeline, &ctx, nixos_pool(1)).await;

    assert_outcome(&report, "windows build", StageOutcome::Failure);
    assert!(matches!(
        report.result("windows build").unwrap().cause,
        Some(FailureCause::Agent { .. })
    ));
    assert!(runner.ran().is_empty());
}
