//! Test: sequential groups stop at the first blocking failure

use crate::helpers::*;
use cigate::core::{ExecutionStatus, FailureCause, Pipeline, Stage, StageOutcome};
use cigate::status::{aggregate, AggregateResult};

#[tokio::test]
async fn test_failure_skips_rest_of_group() {
    let pipeline = Pipeline::new(
        "strict",
        vec![
            Stage::steps("init", ["git submodule update --init"]),
            Stage::steps("lint", ["fail"]),
            Stage::steps("build", ["cargo build"]),
        ],
    );

    let (report, runner) = run(&pipeline).await;

    assert_outcome(&report, "init", StageOutcome::Success);
    assert_outcome(&report, "lint", StageOutcome::Failure);
    assert_outcome(&report, "build", StageOutcome::Skipped);
    assert_skip_reason(&report, "build", "earlier stage 'lint' failed");
    assert_eq!(runner.ran(), vec!["git submodule update --init", "fail"]);

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(aggregate(&report.results), AggregateResult::Failure);
}

#[tokio::test]
async fn test_best_effort_group_keeps_going() {
    let pipeline = Pipeline::new(
        "best effort",
        vec![Stage::sequential(
            "checks",
            vec![
                Stage::steps("style", ["fail"]),
                Stage::steps("licenses", ["./scripts/check-licenses.sh"]),
            ],
        )
        .best_effort()],
    );

    let (report, runner) = run(&pipeline).await;

    assert_outcome(&report, "style", StageOutcome::Failure);
    assert_outcome(&report, "licenses", StageOutcome::Success);
    assert_outcome(&report, "checks", StageOutcome::Failure);
    assert_cause(
        &report,
        "checks",
        FailureCause::ChildFailed {
            stage: "style".to_string(),
        },
    );
    assert_eq!(runner.ran(), vec!["fail", "./scripts/check-licenses.sh"]);
}

#[tokio::test]
async fn test_tolerated_failure_does_not_halt() {
    let pipeline = Pipeline::new(
        "tolerant",
        vec![
            Stage::steps("unit", ["fail"]).unstable_on_failure(),
            Stage::steps("package", ["nix-build"]),
        ],
    );

    let (report, _) = run(&pipeline).await;

    assert_outcome(&report, "unit", StageOutcome::Failure);
    assert_outcome(&report, "package", StageOutcome::Success);
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(aggregate(&report.results), AggregateResult::Unstable);
}

#[tokio::test]
async fn test_post_actions_follow_outcome() {
    let pipeline = Pipeline::new(
        "post",
        vec![Stage::steps("unit", ["fail"])
            .post_success("archive")
            .post_failure("collect-logs")
            .post_always("cleanup")],
    );

    let (report, runner) = run(&pipeline).await;

    assert_eq!(runner.ran(), vec!["fail", "collect-logs", "cleanup"]);
    assert_cause(
        &report,
        "unit",
        FailureCause::CommandFailed {
            command: "fail".to_string(),
            exit_code: Some(1),
        },
    );
}

#[tokio::test]
async fn test_failing_post_action_fails_stage() {
    let pipeline = Pipeline::new(
        "post failure",
        vec![
            Stage::steps("images", ["./scripts/release.sh"])
                .post_always("fail")
                .post_always("docker logout"),
            Stage::steps("after", ["true"]),
        ],
    );

    let (report, runner) = run(&pipeline).await;

    assert_outcome(&report, "images", StageOutcome::Failure);
    assert_cause(
        &report,
        "images",
        FailureCause::PostAction {
            command: "fail".to_string(),
        },
    );
    // every post-action ran despite the failure
    assert!(runner.ran().contains(&"docker logout".to_string()));
    assert_outcome(&report, "after", StageOutcome::Skipped);
}

#[tokio::test]
async fn test_group_always_runs_after_child_failure() {
    let pipeline = Pipeline::new(
        "group post",
        vec![Stage::sequential(
            "e2e",
            vec![
                Stage::steps("setup", ["fail"]),
                Stage::steps("run", ["pytest"]),
            ],
        )
        .post_always("teardown")],
    );

    let (report, runner) = run(&pipeline).await;

    assert_eq!(runner.ran(), vec!["fail", "teardown"]);
    assert_outcome(&report, "run", StageOutcome::Skipped);
    assert_outcome(&report, "e2e", StageOutcome::Failure);
}
