//! Idempotent status publication

use super::{AggregateResult, PublishError, StatusPublisher, StatusTarget, StatusUpdate};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// What a call to [`StatusReporter::publish`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The same state was already published for this target
    Unchanged,
    /// Nothing ran, so no status was sent
    Suppressed,
}

/// Publishes one status per target, remembering what it last sent
pub struct StatusReporter<P> {
    publisher: P,
    target_url: Option<String>,
    published: Mutex<HashMap<StatusTarget, AggregateResult>>,
}

impl<P: StatusPublisher> StatusReporter<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            target_url: None,
            published: Mutex::new(HashMap::new()),
        }
    }

    /// Link attached to every status, usually the build page
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Last state sent for `target`
    pub fn last_published(&self, target: &StatusTarget) -> Option<AggregateResult> {
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(target)
            .copied()
    }

    pub async fn publish(
        &self,
        target: &StatusTarget,
        result: AggregateResult,
    ) -> Result<PublishOutcome, PublishError> {
        if !result.is_publishable() {
            info!("No stage ran for {}, not publishing a status", target.commit);
            return Ok(PublishOutcome::Suppressed);
        }

        if self.last_published(target) == Some(result) {
            debug!("Status {} already published for {}", result, target.commit);
            return Ok(PublishOutcome::Unchanged);
        }

        let update = StatusUpdate::new(target, result, self.target_url.clone());
        self.publisher.publish(target, &update).await?;

        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(target.clone(), result);
        info!("Published status {} for {}@{}", result, target.repository, target.commit);
        Ok(PublishOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPublisher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusPublisher for CountingPublisher {
        async fn publish(&self, _target: &StatusTarget, _update: &StatusUpdate) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn target() -> StatusTarget {
        StatusTarget::new("openebs/io-engine", "abc123", "ci")
    }

    #[tokio::test]
    async fn test_repeated_publish_is_noop() {
        let reporter = StatusReporter::new(CountingPublisher::default());

        let first = reporter.publish(&target(), AggregateResult::Success).await.unwrap();
        let second = reporter.publish(&target(), AggregateResult::Success).await.unwrap();

        assert_eq!(first, PublishOutcome::Published);
        assert_eq!(second, PublishOutcome::Unchanged);
        assert_eq!(reporter.publisher().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_state_overwrites() {
        let reporter = StatusReporter::new(CountingPublisher::default());

        reporter.publish(&target(), AggregateResult::Success).await.unwrap();
        reporter.publish(&target(), AggregateResult::Failure).await.unwrap();

        assert_eq!(reporter.last_published(&target()), Some(AggregateResult::Failure));
        assert_eq!(reporter.publisher().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_built_is_never_published() {
        let reporter = StatusReporter::new(CountingPublisher::default());

        let outcome = reporter.publish(&target(), AggregateResult::NotBuilt).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Suppressed);
        assert_eq!(reporter.publisher().calls.load(Ordering::SeqCst), 0);
        assert_eq!(reporter.last_published(&target()), None);
    }
}
