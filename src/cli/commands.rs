//! CLI command definitions

use crate::core::{BuildCause, ParamValue, ParameterDecl, RunContext};
use clap::Args;
use std::path::PathBuf;

/// Facts about the run that conditions are evaluated against
#[derive(Debug, Args, Clone)]
pub struct ContextArgs {
    /// Branch being built
    #[arg(long, env = "BRANCH_NAME")]
    pub branch: String,

    /// Job name, `<project>/<rest>`
    #[arg(long, env = "JOB_NAME")]
    pub job: String,

    /// Explicit parameter values (key=value); these beat every default
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// What triggered the build (repeatable, defaults to user)
    #[arg(long = "cause", value_enum)]
    pub causes: Vec<CauseArg>,
}

impl ContextArgs {
    pub fn to_context(&self, declared: &[ParameterDecl]) -> RunContext {
        let causes: Vec<BuildCause> = if self.causes.is_empty() {
            vec![BuildCause::User]
        } else {
            self.causes.iter().copied().map(BuildCause::from).collect()
        };

        RunContext::builder(&self.branch, &self.job)
            .declared(declared)
            .params(
                self.params
                    .iter()
                    .map(|(k, v)| (k.clone(), ParamValue::parse(v))),
            )
            .causes(causes)
            .build()
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Directory commands run in and report globs resolve against
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Clone URL; selects registry credentials and the status repository
    #[arg(long, env = "GIT_URL")]
    pub repository: Option<String>,

    /// Commit the status is attached to
    #[arg(long, env = "GIT_COMMIT")]
    pub commit: Option<String>,

    /// Base URL of the commit status API; statuses are only logged without it
    #[arg(long, env = "STATUS_URL")]
    pub status_url: Option<String>,

    /// Token for the commit status API
    #[arg(long, env = "STATUS_TOKEN", hide_env_values = true)]
    pub status_token: Option<String>,

    /// Status context name
    #[arg(long, default_value = "continuous-integration/cigate")]
    pub status_context: String,

    /// Link attached to the published status
    #[arg(long, env = "BUILD_URL")]
    pub build_url: Option<String>,

    /// Don't save the build to history
    #[arg(long)]
    pub no_history: bool,
}

/// Show which stages would run, without running anything
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Resolve the cron trigger for a branch and job
#[derive(Debug, Args, Clone)]
pub struct ScheduleCommand {
    /// Schedule document URL; falls back to the pipeline's `schedule_url`
    #[arg(long, env = "SCHEDULE_URL")]
    pub url: Option<String>,

    /// Pipeline YAML file carrying a `schedule_url`
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Branch being built
    #[arg(long, env = "BRANCH_NAME")]
    pub branch: String,

    /// Job name, `<project>/<rest>`
    #[arg(long, env = "JOB_NAME")]
    pub job: String,
}

/// Show build history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Job to show; lists known jobs when omitted
    #[arg(short, long)]
    pub job: Option<String>,

    /// Number of recent builds to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Build cause argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CauseArg {
    BranchIndexing,
    ScmChange,
    Timer,
    User,
    Upstream,
}

impl From<CauseArg> for BuildCause {
    fn from(arg: CauseArg) -> Self {
        match arg {
            CauseArg::BranchIndexing => BuildCause::BranchIndexing,
            CauseArg::ScmChange => BuildCause::ScmChange,
            CauseArg::Timer => BuildCause::Timer,
            CauseArg::User => BuildCause::User,
            CauseArg::Upstream => BuildCause::Upstream,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
