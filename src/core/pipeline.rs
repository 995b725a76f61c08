//! Pipeline domain model

use crate::core::{
    config::{AgentConfig, PipelineConfig},
    context::ParameterDecl,
    stage::Stage,
};
use std::time::Duration;

/// Whole-run bound when the configuration sets none: 5 hours
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60 * 60);

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Top-level stages, an implicit sequential group
    pub stages: Vec<Stage>,

    /// Global wall-clock timeout
    pub timeout: Duration,

    /// Declared parameters and their defaults
    pub parameters: Vec<ParameterDecl>,

    /// Schedule document location, if the pipeline is cron-triggered
    pub schedule_url: Option<String>,

    /// Worker agents declared alongside the pipeline
    pub agents: Vec<AgentConfig>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
            timeout: DEFAULT_TIMEOUT,
            parameters: ParameterDecl::standard(),
            schedule_url: None,
            agents: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Pipeline {
            name: config.name.clone(),
            stages: config.stages.iter().map(Stage::from_config).collect(),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            parameters: ParameterDecl::with_standard(&config.parameters),
            schedule_url: config.schedule_url.clone(),
            agents: config.agents.clone(),
        }
    }

    /// Find a stage anywhere in the tree
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.all_stages().into_iter().find(|s| s.name == name)
    }

    /// Every stage, depth-first in declaration order
    pub fn all_stages(&self) -> Vec<&Stage> {
        let mut result = Vec::new();
        let mut stack: Vec<&Stage> = self.stages.iter().rev().collect();
        while let Some(stage) = stack.pop() {
            result.push(stage);
            stack.extend(stage.children().iter().rev());
        }
        result
    }

    /// Number of stages, nested ones included
    pub fn stage_count(&self) -> usize {
        self.all_stages().len()
    }
}
