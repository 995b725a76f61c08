//! Build history provider

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteBuildStore;

use crate::core::{BuildRecord, BuildResult, ExecutionStatus, StageOutcome};
use crate::execution::RunReport;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Summary of one build of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Job the build belongs to, `<project>/<branch>`
    pub job_name: String,

    /// Build number, increasing per job
    pub number: u64,

    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub branch: String,

    /// `None` while the build is running
    pub result: Option<BuildResult>,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Stage counts, groups excluded
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BuildSummary {
    /// A build that has started and has no result yet.
    ///
    /// `execution_id` is the engine's, so the finished summary replaces this
    /// record without changing its id.
    pub fn started(
        job_name: &str,
        number: u64,
        execution_id: Uuid,
        pipeline_name: &str,
        branch: &str,
    ) -> Self {
        Self {
            job_name: job_name.to_string(),
            number,
            execution_id,
            pipeline_name: pipeline_name.to_string(),
            branch: branch.to_string(),
            result: None,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Insert or replace a build
    async fn save_build(&self, build: &BuildSummary) -> Result<()>;

    /// Load one build of a job
    async fn load_build(&self, job_name: &str, number: u64) -> Result<Option<BuildSummary>>;

    /// Builds of a job, newest first
    async fn list_builds(&self, job_name: &str) -> Result<Vec<BuildSummary>>;

    /// All job names with at least one build
    async fn list_jobs(&self) -> Result<Vec<String>>;

    async fn next_build_number(&self, job_name: &str) -> Result<u64> {
        let builds = self.list_builds(job_name).await?;
        Ok(builds.iter().map(|b| b.number).max().unwrap_or(0) + 1)
    }

    /// The job's builds as a linked chain, newest at the head
    async fn history_chain(&self, job_name: &str) -> Result<Option<Arc<BuildRecord>>> {
        let builds = self.list_builds(job_name).await?;
        Ok(BuildRecord::chain(
            builds.into_iter().map(|b| (b.number, b.result)).collect::<Vec<_>>(),
        ))
    }
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    builds: tokio::sync::RwLock<HashMap<String, Vec<BuildSummary>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            builds: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        let mut builds = self.builds.write().await;
        let job = builds.entry(build.job_name.clone()).or_default();
        job.retain(|b| b.number != build.number);
        job.push(build.clone());
        job.sort_by(|a, b| b.number.cmp(&a.number));
        Ok(())
    }

    async fn load_build(&self, job_name: &str, number: u64) -> Result<Option<BuildSummary>> {
        let builds = self.builds.read().await;
        Ok(builds
            .get(job_name)
            .and_then(|job| job.iter().find(|b| b.number == number))
            .cloned())
    }

    async fn list_builds(&self, job_name: &str) -> Result<Vec<BuildSummary>> {
        let builds = self.builds.read().await;
        Ok(builds.get(job_name).cloned().unwrap_or_default())
    }

    async fn list_jobs(&self) -> Result<Vec<String>> {
        let builds = self.builds.read().await;
        let mut jobs: Vec<String> = builds.keys().cloned().collect();
        jobs.sort();
        Ok(jobs)
    }
}

/// Create a summary from a finished run
pub fn create_summary(
    job_name: &str,
    number: u64,
    branch: &str,
    report: &RunReport,
    result: BuildResult,
) -> BuildSummary {
    BuildSummary {
        job_name: job_name.to_string(),
        number,
        execution_id: report.execution_id,
        pipeline_name: report.pipeline_name.clone(),
        branch: branch.to_string(),
        result: Some(result),
        status: report.status,
        started_at: report.started_at,
        completed_at: Some(report.finished_at),
        succeeded: report.count(StageOutcome::Success),
        failed: report.count(StageOutcome::Failure),
        skipped: report.count(StageOutcome::Skipped),
    }
}

#[cfg(test)]
pub(crate) fn summary(job: &str, number: u64, result: Option<BuildResult>) -> BuildSummary {
    BuildSummary {
        job_name: job.to_string(),
        number,
        execution_id: Uuid::new_v4(),
        pipeline_name: "io-engine".to_string(),
        branch: "develop".to_string(),
        result,
        status: if result.is_some() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Running
        },
        started_at: Utc::now(),
        completed_at: result.map(|_| Utc::now()),
        succeeded: 3,
        failed: 0,
        skipped: 1,
    }
}
