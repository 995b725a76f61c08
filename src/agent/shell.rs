//! Shell command runner - executes stage commands as local subprocesses

use crate::agent::{AgentError, AgentHandle, CommandOutput, CommandRunner};
use crate::core::Command;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command as Process;
use tracing::{debug, warn};

/// Runs commands through `sh -c` on the local machine
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell executable
    shell: String,

    /// Working directory for every command
    workdir: Option<PathBuf>,

    /// Extra environment passed to every command
    env: Vec<(String, String)>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            workdir: None,
            env: Vec::new(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    /// Run the script and wait for it.
    ///
    /// A non-zero exit is reported in the output, not as an error. Dropping
    /// the returned future kills the process.
    async fn run(&self, agent: &AgentHandle, command: &Command) -> Result<CommandOutput, AgentError> {
        debug!("Running `{}` on {}", command.display_name(), agent.name);

        let mut process = Process::new(&self.shell);
        process
            .arg("-c")
            .arg(&command.script)
            .env("AGENT_NAME", &agent.name)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            process.current_dir(dir);
        }

        let output = process.output().await.map_err(|source| AgentError::Spawn {
            command: command.display_name().to_string(),
            source,
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            warn!(
                "`{}` exited with {:?}: {}",
                command.display_name(),
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}
