//! Build status aggregation and commit status publication

pub mod aggregate;
pub mod publisher;
pub mod reporter;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use aggregate::{aggregate, aggregate_report, build_result, AggregateResult};
pub use publisher::{LogPublisher, WebhookPublisher};
pub use reporter::{PublishOutcome, StatusReporter};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("access token is not a valid header value")]
    InvalidToken,
}

/// The commit and context a status is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StatusTarget {
    /// `<org>/<repo>`
    pub repository: String,
    pub commit: String,
    pub context: String,
}

impl StatusTarget {
    pub fn new(
        repository: impl Into<String>,
        commit: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            commit: commit.into(),
            context: context.into(),
        }
    }
}

/// Payload sent to a publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    /// `success` or `failure`
    pub state: &'static str,
    pub context: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

impl StatusUpdate {
    pub fn new(target: &StatusTarget, result: AggregateResult, target_url: Option<String>) -> Self {
        let (state, description) = match result {
            AggregateResult::Success => ("success", "This commit looks good"),
            AggregateResult::Unstable => ("failure", "This commit is unstable"),
            AggregateResult::Failure => ("failure", "This commit cannot be built"),
            AggregateResult::NotBuilt => ("pending", "Nothing was built"),
        };
        Self {
            state,
            context: target.context.clone(),
            description: description.to_string(),
            target_url,
        }
    }
}

/// Sends a status to wherever commit statuses live
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, target: &StatusTarget, update: &StatusUpdate) -> Result<(), PublishError>;
}
