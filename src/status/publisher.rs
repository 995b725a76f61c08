//! Commit status publishers

use super::{PublishError, StatusPublisher, StatusTarget, StatusUpdate};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use tracing::{debug, info};

/// Writes the status to the log instead of a remote service
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl StatusPublisher for LogPublisher {
    async fn publish(&self, target: &StatusTarget, update: &StatusUpdate) -> Result<(), PublishError> {
        info!(
            "Commit status {}@{} [{}]: {} - {}",
            target.repository, target.commit, target.context, update.state, update.description
        );
        Ok(())
    }
}

/// Posts statuses to a GitHub-compatible `statuses` endpoint.
///
/// The service keeps one status per commit and context, so a repeated post
/// overwrites rather than adds.
#[derive(Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookPublisher {
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> Result<Self, PublishError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("cigate"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| PublishError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, target: &StatusTarget) -> String {
        format!(
            "{}/repos/{}/statuses/{}",
            self.base_url, target.repository, target.commit
        )
    }
}

#[async_trait]
impl StatusPublisher for WebhookPublisher {
    async fn publish(&self, target: &StatusTarget, update: &StatusUpdate) -> Result<(), PublishError> {
        let url = self.endpoint(target);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(update).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AggregateResult;
    use mockito::Matcher;

    fn target() -> StatusTarget {
        StatusTarget::new("openebs/io-engine", "4f2a9c1", "continuous-integration/cigate")
    }

    #[tokio::test]
    async fn test_webhook_posts_json_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/openebs/io-engine/statuses/4f2a9c1")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "state": "success",
                "context": "continuous-integration/cigate"
            })))
            .with_status(201)
            .create_async()
            .await;

        let publisher = WebhookPublisher::new(server.url(), Some("secret")).unwrap();
        let update = StatusUpdate::new(&target(), AggregateResult::Success, None);
        publisher.publish(&target(), &update).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/repos/openebs/io-engine/statuses/4f2a9c1")
            .with_status(422)
            .with_body("bad state")
            .create_async()
            .await;

        let publisher = WebhookPublisher::new(server.url(), None).unwrap();
        let update = StatusUpdate::new(&target(), AggregateResult::Failure, None);
        let err = publisher.publish(&target(), &update).await.unwrap_err();

        assert!(matches!(err, PublishError::Rejected { status: 422, ref body } if body == "bad state"));
    }
}
