//! Schedule document model and lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Key used when no entry matches the branch or project
pub const DEFAULT_KEY: &str = "default";

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("schedule URL is not set")]
    MissingUrl,

    #[error("failed to fetch schedule: {0}")]
    Http(#[from] reqwest::Error),

    #[error("schedule request returned HTTP {0}")]
    Status(u16),

    #[error("failed to parse schedule document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("job name '{0}' has no project segment")]
    InvalidJobName(String),

    #[error("no schedule for branch '{0}' and no default entry")]
    NoBranchEntry(String),

    #[error("no schedule for project '{project}' on branch '{branch}' and no default entry")]
    NoProjectEntry { branch: String, project: String },
}

/// Branch (or `default`) to project (or `default`) to cron expression
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleConfig {
    branches: HashMap<String, HashMap<String, String>>,
}

impl ScheduleConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ScheduleError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Look up the cron expression for a branch and a `<project>/<rest>` job
    pub fn resolve(&self, branch: &str, job: &str) -> Result<String, ScheduleError> {
        let project = project_of(job)?;

        let projects = self
            .branches
            .get(branch)
            .or_else(|| self.branches.get(DEFAULT_KEY))
            .ok_or_else(|| ScheduleError::NoBranchEntry(branch.to_string()))?;

        projects
            .get(project)
            .or_else(|| projects.get(DEFAULT_KEY))
            .cloned()
            .ok_or_else(|| ScheduleError::NoProjectEntry {
                branch: branch.to_string(),
                project: project.to_string(),
            })
    }
}

/// Leading path segment of a job name
pub fn project_of(job: &str) -> Result<&str, ScheduleError> {
    match job.split_once('/') {
        Some((project, _)) if !project.is_empty() => Ok(project),
        _ => Err(ScheduleError::InvalidJobName(job.to_string())),
    }
}
