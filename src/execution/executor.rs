//! Stage executor - runs a stage's commands and post-actions on an agent

use crate::{
    agent::{AgentHandle, CommandRunner},
    core::{Command, FailureCause, PostActions, StageOutcome},
    execution::cancel::CancelSignal,
};
use tracing::{debug, error, info, warn};

/// Executes the commands of a single stage
pub struct StageExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StageExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run the body commands in order, stopping at the first failure.
    ///
    /// Cancellation kills the running command and fails the body with the
    /// cancellation cause.
    pub async fn run_steps(
        &self,
        stage: &str,
        steps: &[Command],
        agent: &AgentHandle,
        cancel: &mut CancelSignal,
    ) -> Result<(), FailureCause> {
        info!("Executing stage: {} on {}", stage, agent.name);

        for command in steps {
            if let Some(reason) = cancel.reason() {
                return Err(reason.cause());
            }

            tokio::select! {
                result = self.run_command(command, agent) => result?,
                reason = cancel.cancelled() => {
                    warn!("Stage {} cancelled during `{}`", stage, command.display_name());
                    return Err(reason.cause());
                }
            }
        }

        debug!("Stage {} body finished", stage);
        Ok(())
    }

    /// Run the post-actions matching `outcome`, `always` last.
    ///
    /// Every applicable post-action runs even when an earlier one fails.
    /// Returns the first failure.
    pub async fn run_post(
        &self,
        stage: &str,
        post: &PostActions,
        outcome: StageOutcome,
        agent: &AgentHandle,
    ) -> Option<FailureCause> {
        let conditional: &[Command] = match outcome {
            StageOutcome::Success => &post.success,
            StageOutcome::Failure => &post.failure,
            StageOutcome::Skipped => &[],
        };

        let mut first_failure = None;
        for command in conditional.iter().chain(post.always.iter()) {
            debug!("Stage {} post-action `{}`", stage, command.display_name());
            if let Err(cause) = self.run_command(command, agent).await {
                error!("Post-action `{}` of stage {} failed: {}", command.display_name(), stage, cause);
                first_failure.get_or_insert(FailureCause::PostAction {
                    command: command.display_name().to_string(),
                });
            }
        }
        first_failure
    }

    async fn run_command(&self, command: &Command, agent: &AgentHandle) -> Result<(), FailureCause> {
        match self.runner.run(agent, command).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(FailureCause::CommandFailed {
                command: command.display_name().to_string(),
                exit_code: output.exit_code,
            }),
            Err(e) => {
                error!("Agent error for `{}`: {}", command.display_name(), e);
                Err(FailureCause::CommandFailed {
                    command: command.display_name().to_string(),
                    exit_code: None,
                })
            }
        }
    }
}
