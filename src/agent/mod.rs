//! Worker agents and the external commands they run

pub mod pool;
pub mod response;
pub mod shell;

use crate::core::Command;
use async_trait::async_trait;
use std::sync::Arc;

pub use pool::{AgentHandle, AgentLease, AgentPool, WorkerSpec};
pub use response::{AgentError, CommandOutput};
pub use shell::ShellRunner;

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command on the given agent and wait for it to exit
    async fn run(&self, agent: &AgentHandle, command: &Command) -> Result<CommandOutput, AgentError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    async fn run(&self, agent: &AgentHandle, command: &Command) -> Result<CommandOutput, AgentError> {
        (**self).run(agent, command).await
    }
}
