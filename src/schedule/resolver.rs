//! Remote schedule resolution

use super::config::{ScheduleConfig, ScheduleError};
use std::time::Duration;
use tracing::{debug, error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches the schedule document and resolves a cron expression from it
#[derive(Clone)]
pub struct ScheduleResolver {
    client: reqwest::Client,
}

impl ScheduleResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download and parse the schedule document
    pub async fn fetch(&self, url: &str) -> Result<ScheduleConfig, ScheduleError> {
        debug!("Fetching schedule from {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScheduleError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        ScheduleConfig::from_yaml(&body)
    }

    /// Resolve the cron expression, surfacing what went wrong
    pub async fn try_resolve(
        &self,
        url: Option<&str>,
        branch: &str,
        job: &str,
    ) -> Result<String, ScheduleError> {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ScheduleError::MissingUrl)?;

        // Reject a malformed job name before any network traffic
        super::config::project_of(job)?;

        self.fetch(url).await?.resolve(branch, job)
    }

    /// Resolve the cron expression for `branch` and `job`.
    ///
    /// Never fails: any problem is logged and yields an empty expression,
    /// which disables the cron trigger.
    pub async fn resolve(&self, url: Option<&str>, branch: &str, job: &str) -> String {
        match self.try_resolve(url, branch, job).await {
            Ok(cron) => {
                debug!("Schedule for {} on {}: '{}'", job, branch, cron);
                cron
            }
            Err(e) => {
                error!("Could not resolve schedule for {} on {}: {}", job, branch, e);
                String::new()
            }
        }
    }
}

impl Default for ScheduleResolver {
    fn default() -> Self {
        Self::new()
    }
}
