//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    agent::{AgentHandle, AgentLease, AgentPool, CommandRunner},
    core::{ExecutionStatus, FailureCause, StageOutcome, StageResult},
    execution::{
        cancel::{CancelHandle, CancelReason, CancelSignal},
        planner::{Decision, ExecutionPlan, PlannedBody, PlannedStage},
        reports, StageExecutor,
    },
};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        stage_count: usize,
    },
    StageStarted {
        stage: String,
        agent: String,
    },
    StageSkipped {
        stage: String,
        reason: String,
    },
    StageFinished {
        stage: String,
        outcome: StageOutcome,
        duration: Duration,
        cause: Option<FailureCause>,
    },
    RunCancelled {
        reason: CancelReason,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the timeout expired or the run was aborted
    pub cancelled: Option<CancelReason>,
    /// One entry per planned stage, groups included
    pub results: HashMap<String, StageResult>,
}

impl RunReport {
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.get(stage)
    }

    pub fn outcome(&self, stage: &str) -> Option<StageOutcome> {
        self.result(stage).map(|r| r.outcome)
    }

    /// Number of stages with a body of commands that ended in `outcome`
    pub fn count(&self, outcome: StageOutcome) -> usize {
        self.results
            .values()
            .filter(|r| !r.is_group && r.outcome == outcome)
            .count()
    }
}

/// Cancels a running execution, like the timeout does
#[derive(Debug, Clone)]
pub struct AbortHandle {
    cancel: CancelHandle,
}

impl AbortHandle {
    pub fn abort(&self) {
        if self.cancel.cancel(CancelReason::Aborted) {
            warn!("Pipeline abort requested");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Completion {
    outcome: StageOutcome,
    /// Failure downgrades to unstable and does not stop a sequential group
    tolerated: bool,
}

impl Completion {
    fn skipped() -> Self {
        Self {
            outcome: StageOutcome::Skipped,
            tolerated: false,
        }
    }

    fn halts(&self) -> bool {
        self.outcome == StageOutcome::Failure && !self.tolerated
    }
}

#[derive(Default)]
struct Recorder {
    results: Mutex<HashMap<String, StageResult>>,
}

impl Recorder {
    fn insert(&self, result: StageResult) {
        let mut results = self.results.lock().unwrap_or_else(|p| p.into_inner());
        results.insert(result.name.clone(), result);
    }

    fn into_results(self) -> HashMap<String, StageResult> {
        self.results.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

/// Main pipeline execution engine.
///
/// One engine drives one run: the abort handle and the timeout share a
/// cancellation signal that is never reset.
pub struct ExecutionEngine<R> {
    execution_id: Uuid,
    executor: StageExecutor<R>,
    pool: AgentPool,
    workspace: PathBuf,
    cancel: CancelHandle,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R, pool: AgentPool) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            executor: StageExecutor::new(runner),
            pool,
            workspace: PathBuf::from("."),
            cancel: CancelHandle::new(),
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Directory report globs are resolved against
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Use an id allocated by the caller, e.g. one already persisted
    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = execution_id;
        self
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::new(handler));
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Emit an event to all handlers
    fn emit(&self, event: ExecutionEvent) {
        let handlers = self
            .event_handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the whole plan under its global timeout
    pub async fn execute(&self, plan: &ExecutionPlan) -> RunReport {
        let execution_id = self.execution_id;
        let started_at = Utc::now();

        info!("Starting pipeline execution: {} ({})", plan.pipeline_name, execution_id);
        self.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: plan.pipeline_name.clone(),
            stage_count: plan.stage_count(),
        });

        let recorder = Recorder::default();
        let controller = AgentHandle::controller();
        let signal = self.cancel.signal();

        // `root` borrows the recorder and must be gone before its results are taken
        let completions = {
            let root = self.run_sequential(&plan.stages, false, &controller, &signal, &recorder);
            tokio::pin!(root);
            let deadline = tokio::time::sleep(plan.timeout);
            tokio::pin!(deadline);

            tokio::select! {
                completions = &mut root => completions,
                _ = &mut deadline => {
                    error!(
                        "Pipeline {} exceeded its timeout of {:?}, cancelling",
                        plan.pipeline_name, plan.timeout
                    );
                    self.cancel.cancel(CancelReason::Timeout);
                    root.await
                }
            }
        };

        let cancelled = self.cancel.reason();
        if let Some(reason) = cancelled {
            self.emit(ExecutionEvent::RunCancelled { reason });
        }

        let blocking_failure = completions.iter().any(|(_, c)| c.halts());
        let status = match cancelled {
            Some(CancelReason::Aborted) => ExecutionStatus::Cancelled,
            Some(CancelReason::Timeout) => ExecutionStatus::Failed,
            None if blocking_failure => ExecutionStatus::Failed,
            None => ExecutionStatus::Completed,
        };

        info!("Pipeline execution finished: {} - {:?}", plan.pipeline_name, status);
        self.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        });

        RunReport {
            execution_id,
            pipeline_name: plan.pipeline_name.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            results: recorder.into_results(),
        }
    }

    /// Run children in order; a blocking failure skips the rest unless
    /// the group is best-effort
    async fn run_sequential(
        &self,
        children: &[PlannedStage],
        best_effort: bool,
        agent: &AgentHandle,
        cancel: &CancelSignal,
        recorder: &Recorder,
    ) -> Vec<(String, Completion)> {
        let mut completions = Vec::with_capacity(children.len());
        let mut halted_by: Option<&str> = None;

        for child in children {
            if let Some(reason) = cancel.reason() {
                self.skip_tree(child, &not_started(reason), recorder);
                completions.push((child.name.clone(), Completion::skipped()));
                continue;
            }
            if let Some(failed) = halted_by {
                self.skip_tree(child, &format!("earlier stage '{}' failed", failed), recorder);
                completions.push((child.name.clone(), Completion::skipped()));
                continue;
            }

            let completion = self.run_stage(child, agent, cancel.clone(), recorder).await;
            if completion.halts() && !best_effort {
                warn!("Stage {} failed, skipping the rest of its group", child.name);
                halted_by = Some(&child.name);
            }
            completions.push((child.name.clone(), completion));
        }

        completions
    }

    /// Run children concurrently; one failing does not stop the others
    async fn run_parallel(
        &self,
        children: &[PlannedStage],
        agent: &AgentHandle,
        cancel: &CancelSignal,
        recorder: &Recorder,
    ) -> Vec<(String, Completion)> {
        let branches = children
            .iter()
            .map(|child| self.run_stage(child, agent, cancel.clone(), recorder));
        let done = join_all(branches).await;

        children.iter().map(|c| c.name.clone()).zip(done).collect()
    }

    fn run_stage<'a>(
        &'a self,
        stage: &'a PlannedStage,
        inherited: &'a AgentHandle,
        mut cancel: CancelSignal,
        recorder: &'a Recorder,
    ) -> BoxFuture<'a, Completion> {
        async move {
            if let Decision::Skip(reason) = &stage.decision {
                self.skip_tree(stage, reason, recorder);
                return Completion::skipped();
            }
            if let Some(reason) = cancel.reason() {
                self.skip_tree(stage, &not_started(reason), recorder);
                return Completion::skipped();
            }

            let lease: Option<AgentLease> = match &stage.agent {
                None => None,
                Some(label) => {
                    let acquired = tokio::select! {
                        biased;
                        reason = cancel.cancelled() => {
                            self.skip_tree(stage, &not_started(reason), recorder);
                            return Completion::skipped();
                        }
                        lease = self.pool.acquire(label) => lease,
                    };
                    match acquired {
                        Ok(lease) => Some(lease),
                        Err(e) => {
                            error!("Stage {} could not get an agent: {}", stage.name, e);
                            for child in stage.children() {
                                self.skip_tree(child, "enclosing stage got no agent", recorder);
                            }
                            let cause = FailureCause::Agent {
                                message: e.to_string(),
                            };
                            let tolerated = stage.unstable_on_failure;
                            return self
                                .finish(
                                    stage,
                                    Instant::now(),
                                    None,
                                    (StageOutcome::Failure, Some(cause), tolerated),
                                    recorder,
                                )
                                .await;
                        }
                    }
                }
            };
            // A lease freed by a cancelled holder can win the race above
            if let Some(reason) = cancel.reason() {
                drop(lease);
                self.skip_tree(stage, &not_started(reason), recorder);
                return Completion::skipped();
            }
            let agent = lease.as_ref().map(AgentLease::handle).unwrap_or(inherited);

            let started = Instant::now();
            self.emit(ExecutionEvent::StageStarted {
                stage: stage.name.clone(),
                agent: agent.name.clone(),
            });

            let (mut outcome, mut cause, mut tolerated) = match &stage.body {
                PlannedBody::Steps(steps) => {
                    match self
                        .executor
                        .run_steps(&stage.name, steps, agent, &mut cancel)
                        .await
                    {
                        Ok(()) => (StageOutcome::Success, None, false),
                        Err(cause) => (StageOutcome::Failure, Some(cause), stage.unstable_on_failure),
                    }
                }
                PlannedBody::Sequential(children) => combine(
                    &self
                        .run_sequential(children, stage.best_effort, agent, &cancel, recorder)
                        .await,
                    stage.unstable_on_failure,
                ),
                PlannedBody::Parallel(children) => combine(
                    &self.run_parallel(children, agent, &cancel, recorder).await,
                    stage.unstable_on_failure,
                ),
            };

            if let Some(post_failure) = self
                .executor
                .run_post(&stage.name, &stage.post, outcome, agent)
                .await
            {
                let keep_body_cause = outcome == StageOutcome::Failure
                    && !matches!(cause, Some(FailureCause::ChildFailed { .. }));
                if !keep_body_cause {
                    cause = Some(post_failure);
                    tolerated = stage.unstable_on_failure;
                }
                outcome = StageOutcome::Failure;
            }

            self.finish(stage, started, Some(agent), (outcome, cause, tolerated), recorder)
                .await
        }
        .boxed()
    }

    async fn finish(
        &self,
        stage: &PlannedStage,
        started: Instant,
        agent: Option<&AgentHandle>,
        (outcome, cause, tolerated): (StageOutcome, Option<FailureCause>, bool),
        recorder: &Recorder,
    ) -> Completion {
        let duration = started.elapsed();
        let (report_paths, tests) = reports::gather(&stage.reports, &self.workspace).await;

        match &cause {
            Some(cause) => warn!("Stage {} failed after {:?}: {}", stage.name, duration, cause),
            None => info!("Stage {} finished: {} ({:?})", stage.name, outcome, duration),
        }

        self.emit(ExecutionEvent::StageFinished {
            stage: stage.name.clone(),
            outcome,
            duration,
            cause: cause.clone(),
        });

        recorder.insert(StageResult {
            name: stage.name.clone(),
            outcome,
            duration,
            reports: report_paths,
            skip_reason: (outcome == StageOutcome::Skipped)
                .then(|| "no nested stage ran".to_string()),
            cause,
            unstable_on_failure: stage.unstable_on_failure,
            is_group: stage.is_group(),
            agent: agent.map(|a| a.name.clone()),
            tests,
        });

        Completion { outcome, tolerated }
    }

    /// Record a stage and everything nested in it as skipped
    fn skip_tree(&self, stage: &PlannedStage, reason: &str, recorder: &Recorder) {
        let mut stack = vec![stage];
        while let Some(current) = stack.pop() {
            let reason = match &current.decision {
                Decision::Skip(own) => own.as_str(),
                Decision::Run => reason,
            };
            info!("Skipping stage {}: {}", current.name, reason);
            self.emit(ExecutionEvent::StageSkipped {
                stage: current.name.clone(),
                reason: reason.to_string(),
            });

            let mut result = StageResult::skipped(&current.name, reason, current.is_group());
            result.unstable_on_failure = current.unstable_on_failure;
            recorder.insert(result);

            stack.extend(current.children().iter().rev());
        }
    }
}

fn not_started(reason: CancelReason) -> String {
    match reason {
        CancelReason::Timeout => "not started before the global timeout".to_string(),
        CancelReason::Aborted => "not started before the run was aborted".to_string(),
    }
}

/// Reduce a group's children into the group's own outcome
fn combine(
    children: &[(String, Completion)],
    tolerant: bool,
) -> (StageOutcome, Option<FailureCause>, bool) {
    let failed: Vec<&(String, Completion)> = children
        .iter()
        .filter(|(_, c)| c.outcome == StageOutcome::Failure)
        .collect();

    if let Some((first, _)) = failed.first() {
        let tolerated = tolerant || failed.iter().all(|(_, c)| c.tolerated);
        return (
            StageOutcome::Failure,
            Some(FailureCause::ChildFailed {
                stage: first.clone(),
            }),
            tolerated,
        );
    }

    if children.iter().all(|(_, c)| c.outcome == StageOutcome::Skipped) {
        (StageOutcome::Skipped, None, false)
    } else {
        (StageOutcome::Success, None, false)
    }
}
