//! Test: stages gated on branch, parameters and build cause

use crate::helpers::*;
use cigate::agent::{AgentPool, WorkerSpec};
use cigate::core::config::PipelineConfig;
use cigate::core::{BuildCause, ParamValue, Pipeline, RunContext, StageOutcome};
use cigate::status::{aggregate, AggregateResult};

const PIPELINE: &str = r#"
name: "io-engine"
agents:
  - name: "nix-1"
    labels: ["nixos"]
    executors: 2
stages:
  - name: "lint"
    agent: "nixos"
    when:
      - not:
          param:
            name: "build_images"
            equals: true
    steps: ["./scripts/rust-linter.sh"]
  - name: "tests"
    when:
      - param:
          name: "run_tests"
          equals: true
    parallel:
      - name: "rust unit"
        agent: "nixos"
        unstable_on_failure: true
        steps: ["./scripts/cargo-test.sh"]
      - name: "python"
        agent: "nixos"
        steps: ["./scripts/pytest-tests.sh"]
  - name: "build images"
    agent: "nixos"
    when:
      - any_of:
          - branch: "develop"
          - branch_glob: "release/*"
      - param:
          name: "build_images"
          equals: true
    steps: ["./scripts/release.sh"]
    post:
      always: ["docker logout"]
"#;

fn pipeline() -> Pipeline {
    PipelineConfig::from_yaml(PIPELINE).unwrap().to_pipeline()
}

fn pool() -> AgentPool {
    AgentPool::new(vec![WorkerSpec::new("nix-1", &["nixos"], 2)])
}

#[tokio::test]
async fn test_push_to_feature_branch_runs_tests() {
    let (report, runner) =
        run_with(&pipeline(), &context("feature/x", BuildCause::ScmChange), pool()).await;

    assert_outcome(&report, "lint", StageOutcome::Success);
    assert_outcome(&report, "rust unit", StageOutcome::Success);
    assert_outcome(&report, "python", StageOutcome::Success);
    assert_outcome(&report, "build images", StageOutcome::Skipped);
    assert!(!runner.ran().contains(&"./scripts/release.sh".to_string()));
    assert_eq!(aggregate(&report.results), AggregateResult::Success);
}

#[tokio::test]
async fn test_indexing_on_release_branch_builds_images() {
    let (report, runner) = run_with(
        &pipeline(),
        &context("release/1.0", BuildCause::BranchIndexing),
        pool(),
    )
    .await;

    assert_outcome(&report, "lint", StageOutcome::Skipped);
    assert_outcome(&report, "tests", StageOutcome::Skipped);
    assert_outcome(&report, "python", StageOutcome::Skipped);
    assert_skip_reason(&report, "python", "enclosing stage 'tests' skipped");
    assert_outcome(&report, "build images", StageOutcome::Success);
    assert_eq!(runner.ran(), vec!["./scripts/release.sh", "docker logout"]);
}

#[tokio::test]
async fn test_explicit_run_tests_beats_indexing_override() {
    let pipeline = pipeline();
    let ctx = RunContext::builder("release/1.0", "io-engine/release%2F1.0")
        .declared(&pipeline.parameters)
        .param("run_tests", ParamValue::Bool(true))
        .cause(BuildCause::BranchIndexing)
        .build();

    let (report, _) = run_with(&pipeline, &ctx, pool()).await;

    assert_outcome(&report, "rust unit", StageOutcome::Success);
    assert_outcome(&report, "build images", StageOutcome::Success);
}

#[tokio::test]
async fn test_indexing_on_feature_branch_builds_nothing_new() {
    let pipeline = pipeline();
    let ctx = RunContext::builder("feature/x", "io-engine/feature%2Fx")
        .declared(&pipeline.parameters)
        .param("run_tests", ParamValue::Bool(false))
        .param("build_images", ParamValue::Bool(true))
        .cause(BuildCause::BranchIndexing)
        .build();

    let (report, runner) = run_with(&pipeline, &ctx, pool()).await;

    assert!(runner.ran().is_empty());
    assert_eq!(aggregate(&report.results), AggregateResult::NotBuilt);
}
