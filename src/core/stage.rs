//! Stage domain model

use crate::core::{
    condition::Condition,
    config::{CommandConfig, ConditionConfig, PostConfig, StageConfig},
};

/// One external invocation, run through the agent's shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Display name; defaults to the script itself
    pub label: Option<String>,

    /// Shell script passed to `sh -c`
    pub script: String,
}

impl Command {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            label: None,
            script: script.into(),
        }
    }

    pub fn named(label: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            script: script.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.script)
    }

    fn from_config(config: &CommandConfig) -> Self {
        match config {
            CommandConfig::Script(script) => Command::new(script.clone()),
            CommandConfig::Named { name, run } => Command::named(name.clone(), run.clone()),
        }
    }
}

impl From<&str> for Command {
    fn from(script: &str) -> Self {
        Command::new(script)
    }
}

/// Post-actions keyed by outcome class
#[derive(Debug, Clone, Default)]
pub struct PostActions {
    /// Run after the body whatever happened, cancellation included
    pub always: Vec<Command>,
    pub success: Vec<Command>,
    pub failure: Vec<Command>,
}

impl PostActions {
    pub fn is_empty(&self) -> bool {
        self.always.is_empty() && self.success.is_empty() && self.failure.is_empty()
    }

    fn from_config(config: &PostConfig) -> Self {
        let convert = |cmds: &[CommandConfig]| cmds.iter().map(Command::from_config).collect();
        Self {
            always: convert(&config.always),
            success: convert(&config.success),
            failure: convert(&config.failure),
        }
    }
}

/// What a stage does when it runs
#[derive(Debug, Clone)]
pub enum StageBody {
    /// Ordered external commands
    Steps(Vec<Command>),
    /// Nested stages, one after the other
    Sequential(Vec<Stage>),
    /// Nested stages, all at once
    Parallel(Vec<Stage>),
}

/// A named unit of pipeline work
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,

    /// Worker label the stage must run on
    pub agent: Option<String>,

    /// All must hold for the stage to execute
    pub conditions: Vec<Condition>,

    pub body: StageBody,

    pub post: PostActions,

    /// Keep running the rest of a sequential group after a failure
    pub best_effort: bool,

    /// Failure downgrades the build to unstable instead of failing it
    pub unstable_on_failure: bool,

    /// JUnit report globs collected after the body
    pub reports: Vec<String>,
}

impl Stage {
    fn with_body(name: impl Into<String>, body: StageBody) -> Self {
        Self {
            name: name.into(),
            agent: None,
            conditions: Vec::new(),
            body,
            post: PostActions::default(),
            best_effort: false,
            unstable_on_failure: false,
            reports: Vec::new(),
        }
    }

    pub fn steps<I, C>(name: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Command>,
    {
        Self::with_body(
            name,
            StageBody::Steps(steps.into_iter().map(Into::into).collect()),
        )
    }

    pub fn sequential(name: impl Into<String>, children: Vec<Stage>) -> Self {
        Self::with_body(name, StageBody::Sequential(children))
    }

    pub fn parallel(name: impl Into<String>, children: Vec<Stage>) -> Self {
        Self::with_body(name, StageBody::Parallel(children))
    }

    pub fn on_agent(mut self, label: impl Into<String>) -> Self {
        self.agent = Some(label.into());
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn post_always(mut self, command: impl Into<Command>) -> Self {
        self.post.always.push(command.into());
        self
    }

    pub fn post_success(mut self, command: impl Into<Command>) -> Self {
        self.post.success.push(command.into());
        self
    }

    pub fn post_failure(mut self, command: impl Into<Command>) -> Self {
        self.post.failure.push(command.into());
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    pub fn unstable_on_failure(mut self) -> Self {
        self.unstable_on_failure = true;
        self
    }

    pub fn report(mut self, glob: impl Into<String>) -> Self {
        self.reports.push(glob.into());
        self
    }

    /// Create a stage from its YAML configuration
    pub fn from_config(config: &StageConfig) -> Self {
        let body = if !config.parallel.is_empty() {
            StageBody::Parallel(config.parallel.iter().map(Stage::from_config).collect())
        } else if !config.sequential.is_empty() {
            StageBody::Sequential(config.sequential.iter().map(Stage::from_config).collect())
        } else {
            StageBody::Steps(config.steps.iter().map(Command::from_config).collect())
        };

        Stage {
            name: config.name.clone(),
            agent: config.agent.clone(),
            conditions: config.when.iter().map(condition_from_config).collect(),
            body,
            post: PostActions::from_config(&config.post),
            best_effort: config.best_effort,
            unstable_on_failure: config.unstable_on_failure,
            reports: config.reports.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        !matches!(self.body, StageBody::Steps(_))
    }

    /// Nested stages; empty for a steps stage
    pub fn children(&self) -> &[Stage] {
        match &self.body {
            StageBody::Steps(_) => &[],
            StageBody::Sequential(children) | StageBody::Parallel(children) => children,
        }
    }
}

fn condition_from_config(config: &ConditionConfig) -> Condition {
    match config {
        ConditionConfig::Branch(name) => Condition::BranchEquals(name.clone()),
        ConditionConfig::BranchGlob(pattern) => Condition::BranchMatchesGlob(pattern.clone()),
        ConditionConfig::Param { name, equals } => Condition::ParamEquals {
            key: name.clone(),
            expected: equals.clone(),
        },
        ConditionConfig::Cause(cause) => Condition::CauseIs(*cause),
        ConditionConfig::Not(inner) => Condition::Not(Box::new(condition_from_config(inner))),
        ConditionConfig::AnyOf(options) => {
            Condition::AnyOf(options.iter().map(condition_from_config).collect())
        }
        ConditionConfig::AllOf(all) => {
            Condition::AllOf(all.iter().map(condition_from_config).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_flags() {
        let stage = Stage::steps("unit", ["cargo test"])
            .on_agent("nixos")
            .unstable_on_failure()
            .post_always("docker logout")
            .report("target/junit/*.xml");

        assert_eq!(stage.agent.as_deref(), Some("nixos"));
        assert!(stage.unstable_on_failure);
        assert!(!stage.is_group());
        assert_eq!(stage.post.always, vec![Command::new("docker logout")]);
        assert_eq!(stage.reports, vec!["target/junit/*.xml".to_string()]);
    }

    #[test]
    fn test_group_children() {
        let group = Stage::parallel(
            "tests",
            vec![Stage::steps("unit", ["true"]), Stage::steps("e2e", ["true"])],
        );
        assert!(group.is_group());
        assert_eq!(group.children().len(), 2);
    }

    #[test]
    fn test_command_display_name() {
        assert_eq!(Command::new("./scripts/lint.sh").display_name(), "./scripts/lint.sh");
        assert_eq!(Command::named("lint", "./scripts/lint.sh").display_name(), "lint");
    }
}
