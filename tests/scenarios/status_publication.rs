//! Test: one commit status per build, none when nothing ran

use crate::helpers::*;
use cigate::core::{Pipeline, Stage};
use cigate::status::{
    aggregate, AggregateResult, PublishOutcome, StatusReporter, StatusTarget, WebhookPublisher,
};
use mockito::Matcher;

fn target() -> StatusTarget {
    StatusTarget::new("openebs/io-engine", "4f2a9c1", "continuous-integration/cigate")
}

#[tokio::test]
async fn test_unstable_build_published_once() {
    let pipeline = Pipeline::new(
        "unstable",
        vec![
            Stage::steps("lint", ["./scripts/rust-linter.sh"]),
            Stage::steps("unit", ["fail"]).unstable_on_failure(),
        ],
    );
    let (report, _) = run(&pipeline).await;
    let result = aggregate(&report.results);
    assert_eq!(result, AggregateResult::Unstable);

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/openebs/io-engine/statuses/4f2a9c1")
        .match_body(Matcher::PartialJson(serde_json::json!({ "state": "failure" })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let reporter = StatusReporter::new(WebhookPublisher::new(server.url(), None).unwrap());
    assert_eq!(
        reporter.publish(&target(), result).await.unwrap(),
        PublishOutcome::Published
    );
    assert_eq!(
        reporter.publish(&target(), result).await.unwrap(),
        PublishOutcome::Unchanged
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn test_all_skipped_publishes_nothing() {
    let pipeline = Pipeline::new(
        "gated",
        vec![Stage::steps("images", ["./scripts/release.sh"])
            .when(cigate::core::Condition::branch("develop"))],
    );
    let (report, runner) = run(&pipeline).await;
    assert!(runner.ran().is_empty());

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let reporter = StatusReporter::new(WebhookPublisher::new(server.url(), None).unwrap());
    let outcome = reporter
        .publish(&target(), aggregate(&report.results))
        .await
        .unwrap();

    assert_eq!(outcome, PublishOutcome::Suppressed);
    mock.assert_async().await;
}
