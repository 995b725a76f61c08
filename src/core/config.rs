//! Pipeline configuration from YAML

use crate::core::{
    context::{BuildCause, ParamValue, ParameterDecl, BUILD_IMAGES, RUN_TESTS},
    Pipeline,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Wall-clock bound for the whole run (defaults to 5 hours)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Where the cron schedule document lives
    #[serde(default)]
    pub schedule_url: Option<String>,

    /// Declared build parameters with defaults
    #[serde(default = "ParameterDecl::standard")]
    pub parameters: Vec<ParameterDecl>,

    /// Worker agents available to this pipeline
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Top-level stages, run in order
    pub stages: Vec<StageConfig>,
}

/// A worker agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    #[serde(default)]
    pub labels: Vec<String>,

    /// Number of stages the agent runs at once
    #[serde(default = "default_executors")]
    pub executors: usize,
}

fn default_executors() -> usize {
    1
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Agent label the stage needs
    #[serde(default)]
    pub agent: Option<String>,

    /// Gating predicates, all of which must hold
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub when: Vec<ConditionConfig>,

    #[serde(default)]
    pub steps: Vec<CommandConfig>,

    #[serde(default)]
    pub sequential: Vec<StageConfig>,

    #[serde(default)]
    pub parallel: Vec<StageConfig>,

    #[serde(default)]
    pub post: PostConfig,

    /// Keep going after a failure inside this group
    #[serde(default)]
    pub best_effort: bool,

    /// Failure marks the build unstable instead of failed
    #[serde(default)]
    pub unstable_on_failure: bool,

    /// JUnit report globs
    #[serde(default)]
    pub reports: Vec<String>,
}

/// A command: a bare script or a named one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    Script(String),
    Named { name: String, run: String },
}

/// Post-actions per outcome class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default)]
    pub always: Vec<CommandConfig>,

    #[serde(default)]
    pub success: Vec<CommandConfig>,

    #[serde(default)]
    pub failure: Vec<CommandConfig>,
}

/// Gating predicate as written in YAML, e.g. `- branch_glob: "release/*"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionConfig {
    Branch(String),
    BranchGlob(String),
    Param { name: String, equals: ParamValue },
    Cause(BuildCause),
    Not(Box<ConditionConfig>),
    AnyOf(Vec<ConditionConfig>),
    AllOf(Vec<ConditionConfig>),
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no stages", self.name);
        }

        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be greater than zero");
        }

        let mut seen_params = HashSet::new();
        for param in &self.parameters {
            if !seen_params.insert(param.name.as_str()) {
                anyhow::bail!("Duplicate parameter: {}", param.name);
            }
        }

        let mut seen_agents = HashSet::new();
        for agent in &self.agents {
            if !seen_agents.insert(agent.name.as_str()) {
                anyhow::bail!("Duplicate agent: {}", agent.name);
            }
            if agent.executors == 0 {
                anyhow::bail!("Agent '{}' must have at least one executor", agent.name);
            }
        }

        let labels: HashSet<&str> = self
            .agents
            .iter()
            .flat_map(|a| a.labels.iter().map(String::as_str))
            .collect();

        let mut seen_stages = HashSet::new();
        for stage in &self.stages {
            self.validate_stage(stage, &seen_params, &labels, &mut seen_stages)?;
        }

        Ok(())
    }

    fn validate_stage<'a>(
        &self,
        stage: &'a StageConfig,
        params: &HashSet<&str>,
        labels: &HashSet<&str>,
        seen: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if !seen.insert(stage.name.as_str()) {
            anyhow::bail!("Duplicate stage name: {}", stage.name);
        }

        let bodies = [
            !stage.steps.is_empty(),
            !stage.sequential.is_empty(),
            !stage.parallel.is_empty(),
        ];
        match bodies.iter().filter(|b| **b).count() {
            0 => anyhow::bail!(
                "Stage '{}' needs one of 'steps', 'sequential' or 'parallel'",
                stage.name
            ),
            1 => {}
            _ => anyhow::bail!(
                "Stage '{}' mixes 'steps', 'sequential' and 'parallel'",
                stage.name
            ),
        }

        if let Some(label) = &stage.agent {
            if !self.agents.is_empty() && !labels.contains(label.as_str()) {
                anyhow::bail!(
                    "Stage '{}' requires agent label '{}' which no agent provides",
                    stage.name,
                    label
                );
            }
        }

        for pattern in &stage.reports {
            if let Err(e) = glob::Pattern::new(pattern) {
                anyhow::bail!(
                    "Stage '{}' report pattern '{}' is not a valid glob: {}",
                    stage.name,
                    pattern,
                    e
                );
            }
        }

        let mut pending: Vec<&ConditionConfig> = stage.when.iter().collect();
        while let Some(condition) = pending.pop() {
            match condition {
                ConditionConfig::Param { name, .. } => {
                    let known = params.contains(name.as_str())
                        || name == RUN_TESTS
                        || name == BUILD_IMAGES;
                    if !known {
                        anyhow::bail!(
                            "Stage '{}' condition references undeclared parameter '{}'",
                            stage.name,
                            name
                        );
                    }
                }
                ConditionConfig::Not(inner) => pending.push(inner),
                ConditionConfig::AnyOf(list) | ConditionConfig::AllOf(list) => {
                    pending.extend(list.iter())
                }
                ConditionConfig::Branch(_)
                | ConditionConfig::BranchGlob(_)
                | ConditionConfig::Cause(_) => {}
            }
        }

        for child in stage.sequential.iter().chain(stage.parallel.iter()) {
            self.validate_stage(child, params, labels, seen)?;
        }

        Ok(())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
