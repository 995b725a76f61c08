//! Execution planner - decides which stages run before anything starts

use crate::core::{
    condition::first_unmet, Command, Pipeline, PostActions, RunContext, Stage, StageBody,
};
use std::time::Duration;

/// Whether a planned stage runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip(String),
}

/// A stage with its conditions already decided
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub name: String,
    pub decision: Decision,
    pub agent: Option<String>,
    pub body: PlannedBody,
    pub post: PostActions,
    pub best_effort: bool,
    /// Inherited by nested stages of a tolerant group
    pub unstable_on_failure: bool,
    pub reports: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum PlannedBody {
    Steps(Vec<Command>),
    Sequential(Vec<PlannedStage>),
    Parallel(Vec<PlannedStage>),
}

impl PlannedStage {
    pub fn will_run(&self) -> bool {
        self.decision == Decision::Run
    }

    pub fn is_group(&self) -> bool {
        !matches!(self.body, PlannedBody::Steps(_))
    }

    pub fn children(&self) -> &[PlannedStage] {
        match &self.body {
            PlannedBody::Steps(_) => &[],
            PlannedBody::Sequential(children) | PlannedBody::Parallel(children) => children,
        }
    }
}

/// The concrete plan for one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub pipeline_name: String,
    pub timeout: Duration,
    /// Top-level stages, run in order
    pub stages: Vec<PlannedStage>,
}

impl ExecutionPlan {
    /// Every planned stage, depth-first in declaration order
    pub fn all_stages(&self) -> Vec<&PlannedStage> {
        let mut result = Vec::new();
        let mut stack: Vec<&PlannedStage> = self.stages.iter().rev().collect();
        while let Some(stage) = stack.pop() {
            result.push(stage);
            stack.extend(stage.children().iter().rev());
        }
        result
    }

    pub fn stage(&self, name: &str) -> Option<&PlannedStage> {
        self.all_stages().into_iter().find(|s| s.name == name)
    }

    pub fn stage_count(&self) -> usize {
        self.all_stages().len()
    }

    /// Stages with a body of commands that are set to run
    pub fn runnable_steps(&self) -> usize {
        self.all_stages()
            .iter()
            .filter(|s| s.will_run() && !s.is_group())
            .count()
    }
}

/// Turn the pipeline into a plan for this context.
///
/// Every condition is evaluated here, once. A stage inside a skipped group
/// is skipped with it.
pub fn plan(pipeline: &Pipeline, ctx: &RunContext) -> ExecutionPlan {
    ExecutionPlan {
        pipeline_name: pipeline.name.clone(),
        timeout: pipeline.timeout,
        stages: pipeline
            .stages
            .iter()
            .map(|s| plan_stage(s, ctx, None, false))
            .collect(),
    }
}

fn plan_stage(
    stage: &Stage,
    ctx: &RunContext,
    skipped_parent: Option<&str>,
    tolerant_parent: bool,
) -> PlannedStage {
    let decision = match skipped_parent {
        Some(parent) => Decision::Skip(format!("enclosing stage '{}' skipped", parent)),
        None => match first_unmet(&stage.conditions, ctx) {
            Some(condition) => Decision::Skip(format!("condition not met: {}", condition)),
            None => Decision::Run,
        },
    };

    let skipped_here = match &decision {
        Decision::Run => None,
        Decision::Skip(_) => Some(skipped_parent.unwrap_or(&stage.name)),
    };
    let tolerant = tolerant_parent || stage.unstable_on_failure;

    let plan_children = |children: &[Stage]| -> Vec<PlannedStage> {
        children
            .iter()
            .map(|child| plan_stage(child, ctx, skipped_here, tolerant))
            .collect()
    };

    let body = match &stage.body {
        StageBody::Steps(steps) => PlannedBody::Steps(steps.clone()),
        StageBody::Sequential(children) => PlannedBody::Sequential(plan_children(children)),
        StageBody::Parallel(children) => PlannedBody::Parallel(plan_children(children)),
    };

    PlannedStage {
        name: stage.name.clone(),
        decision,
        agent: stage.agent.clone(),
        body,
        post: stage.post.clone(),
        best_effort: stage.best_effort,
        unstable_on_failure: tolerant,
        reports: stage.reports.clone(),
    }
}
