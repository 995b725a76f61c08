//! Test utility functions for cigate

use async_trait::async_trait;
use cigate::agent::{AgentError, AgentHandle, AgentPool, CommandOutput, CommandRunner};
use cigate::core::{
    BuildCause, Command, FailureCause, ParameterDecl, Pipeline, RunContext, StageOutcome,
};
use cigate::execution::{plan, ExecutionEngine, RunReport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Runner whose behaviour comes from the script text:
///
/// - `fail` exits 1
/// - `hang` never exits
/// - `sleep <ms>` exits 0 after the delay
/// - anything else exits 0 at once
#[derive(Default)]
pub struct ScriptedRunner {
    log: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts in the order they started
    pub fn ran(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }

    /// Agent a script ran on
    pub fn agent_of(&self, script: &str) -> Option<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(_, s)| s == script)
            .map(|(agent, _)| agent.clone())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, agent: &AgentHandle, command: &Command) -> Result<CommandOutput, AgentError> {
        self.log
            .lock()
            .unwrap()
            .push((agent.name.clone(), command.script.clone()));

        let script = command.script.as_str();
        if let Some(ms) = script.strip_prefix("sleep ") {
            let ms: u64 = ms.parse().expect("sleep takes milliseconds");
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(CommandOutput::with_code(0));
        }
        match script {
            "fail" => Ok(CommandOutput::with_code(1)),
            "hang" => std::future::pending().await,
            _ => Ok(CommandOutput::with_code(0)),
        }
    }
}

/// Context for a run of `io-engine/<branch>`
pub fn context(branch: &str, cause: BuildCause) -> RunContext {
    RunContext::builder(branch, format!("io-engine/{}", branch))
        .declared(&ParameterDecl::standard())
        .cause(cause)
        .build()
}

/// Plan and execute a pipeline against a fresh scripted runner
pub async fn run_with(
    pipeline: &Pipeline,
    ctx: &RunContext,
    pool: AgentPool,
) -> (RunReport, Arc<ScriptedRunner>) {
    let runner = ScriptedRunner::new();
    let engine = ExecutionEngine::new(runner.clone(), pool);
    let report = engine.execute(&plan(pipeline, ctx)).await;
    (report, runner)
}

/// Run on a push to a feature branch, without worker agents
pub async fn run(pipeline: &Pipeline) -> (RunReport, Arc<ScriptedRunner>) {
    run_with(
        pipeline,
        &context("feature/x", BuildCause::ScmChange),
        AgentPool::new(vec![]),
    )
    .await
}

pub fn assert_outcome(report: &RunReport, stage: &str, expected: StageOutcome) {
    let result = report
        .result(stage)
        .unwrap_or_else(|| panic!("stage '{}' has no result", stage));
    assert_eq!(
        result.outcome, expected,
        "stage '{}' expected {}, got {} ({:?})",
        stage, expected, result.outcome, result.cause
    );
}

pub fn assert_cause(report: &RunReport, stage: &str, expected: FailureCause) {
    assert_eq!(report.result(stage).unwrap().cause, Some(expected));
}

pub fn assert_skip_reason(report: &RunReport, stage: &str, fragment: &str) {
    let reason = report.result(stage).unwrap().skip_reason.clone().unwrap_or_default();
    assert!(
        reason.contains(fragment),
        "stage '{}' skip reason '{}' does not mention '{}'",
        stage,
        reason,
        fragment
    );
}
