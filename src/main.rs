use anyhow::{Context, Result};
use cigate::agent::{AgentPool, ShellRunner};
use cigate::cli::commands::{
    HistoryCommand, PlanCommand, RunCommand, ScheduleCommand, ValidateCommand,
};
use cigate::cli::output::*;
use cigate::cli::{Cli, Command};
use cigate::core::config::PipelineConfig;
use cigate::core::credentials::{org_from_repository, registry_credential_id, repository_slug};
use cigate::core::{last_non_aborted, ExecutionStatus, RunContext};
use cigate::execution::{plan, ExecutionEngine, ExecutionEvent, RunReport};
use cigate::persistence::{create_summary, BuildSummary, InMemoryPersistence, PersistenceBackend};
use cigate::schedule::{CronTrigger, ScheduleResolver};
use cigate::status::{
    aggregate_report, build_result, AggregateResult, LogPublisher, PublishOutcome, StatusPublisher,
    StatusReporter, StatusTarget, WebhookPublisher,
};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Plan(cmd) => show_plan(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Schedule(cmd) => resolve_schedule(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn open_store(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(cigate::persistence::SqliteBuildStore::with_default_path().await?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without SQLite support, history is not kept between runs");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let pipeline = config.to_pipeline();

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    let ctx = cmd.context.to_context(&pipeline.parameters);
    let plan = plan(&pipeline, &ctx);
    println!("{}", format_plan(&plan));

    let store = open_store(cmd.no_history).await?;
    let number = store.next_build_number(ctx.job()).await?;

    let runner = shell_runner(cmd, &ctx, number);
    let engine = ExecutionEngine::new(runner, AgentPool::from_configs(&pipeline.agents))
        .with_workspace(&cmd.workdir);

    let pending = BuildSummary::started(
        ctx.job(),
        number,
        engine.execution_id(),
        &pipeline.name,
        ctx.branch(),
    );
    store.save_build(&pending).await?;

    // Set up event handler for console output
    let progress = create_progress_bar(plan.stage_count());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        if matches!(
            event,
            ExecutionEvent::StageFinished { .. } | ExecutionEvent::StageSkipped { .. }
        ) {
            bar.inc(1);
        }
        if let ExecutionEvent::StageStarted { stage, .. } = &event {
            bar.set_message(stage.clone());
        }
        bar.println(format_execution_event(&event));
    });

    let abort = engine.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    // Execute pipeline
    println!();
    let report = engine.execute(&plan).await;
    progress.finish_and_clear();

    println!("\n{}", format_report(&plan, &report));

    let aggregate = aggregate_report(&report);
    store
        .save_build(&create_summary(ctx.job(), number, ctx.branch(), &report, build_result(&report)))
        .await?;

    publish_status(cmd, aggregate).await;

    print_final_status(&report, aggregate);
    if report.status != ExecutionStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}

/// Command runner with the build's facts in its environment
fn shell_runner(cmd: &RunCommand, ctx: &RunContext, number: u64) -> ShellRunner {
    let mut runner = ShellRunner::new()
        .with_workdir(&cmd.workdir)
        .with_env("BRANCH_NAME", ctx.branch())
        .with_env("JOB_NAME", ctx.job())
        .with_env("BUILD_NUMBER", number.to_string());

    for (key, value) in ctx.parameters() {
        runner = runner.with_env(key.to_uppercase(), value.to_string());
    }

    if let Some(repository) = &cmd.repository {
        match org_from_repository(repository) {
            Some(org) => {
                runner = runner.with_env("REGISTRY_CREDENTIALS_ID", registry_credential_id(org));
            }
            None => warn!("Cannot derive an organization from '{}'", repository),
        }
    }

    runner
}

async fn publish_status(cmd: &RunCommand, result: AggregateResult) {
    let (Some(repository), Some(commit)) = (&cmd.repository, &cmd.commit) else {
        return;
    };
    let Some(slug) = repository_slug(repository) else {
        warn!("Cannot derive a repository from '{}', no status published", repository);
        return;
    };
    let target = StatusTarget::new(slug, commit, &cmd.status_context);

    let published = match &cmd.status_url {
        Some(url) => match WebhookPublisher::new(url, cmd.status_token.as_deref()) {
            Ok(publisher) => send_status(publisher, cmd, &target, result).await,
            Err(e) => Err(e.into()),
        },
        None => send_status(LogPublisher, cmd, &target, result).await,
    };

    match published {
        Ok(PublishOutcome::Suppressed) => {
            println!("{} Nothing ran, no commit status published", WARN);
        }
        Ok(_) => {}
        Err(e) => error!("Failed to publish commit status: {:#}", e),
    }
}

async fn send_status<P: StatusPublisher>(
    publisher: P,
    cmd: &RunCommand,
    target: &StatusTarget,
    result: AggregateResult,
) -> Result<PublishOutcome> {
    let mut reporter = StatusReporter::new(publisher);
    if let Some(url) = &cmd.build_url {
        reporter = reporter.with_target_url(url);
    }
    Ok(reporter.publish(target, result).await?)
}

fn print_final_status(report: &RunReport, aggregate: AggregateResult) {
    let icon = match report.status {
        ExecutionStatus::Completed => CHECK,
        _ => CROSS,
    };
    let elapsed = report
        .finished_at
        .signed_duration_since(report.started_at)
        .to_std()
        .unwrap_or_default();

    println!(
        "\n{} {} {} - build {} in {}",
        icon,
        style(&report.pipeline_name).bold(),
        format_status(report.status),
        format_aggregate(aggregate),
        format_duration(elapsed)
    );
}

fn show_plan(cmd: &PlanCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let pipeline = config.to_pipeline();
    let ctx = cmd.context.to_context(&pipeline.parameters);
    let plan = plan(&pipeline, &ctx);

    if cmd.json {
        let stages: Vec<_> = plan
            .all_stages()
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "run": s.will_run(),
                    "agent": s.agent,
                    "skip_reason": match &s.decision {
                        cigate::execution::Decision::Skip(reason) => Some(reason.as_str()),
                        cigate::execution::Decision::Run => None,
                    },
                })
            })
            .collect();
        let data = serde_json::json!({
            "pipeline": plan.pipeline_name,
            "parameters": ctx.parameters(),
            "stages": stages,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}", format_plan(&plan));
        println!(
            "\n{} {} of {} stages with commands will run",
            INFO,
            style(plan.runnable_steps()).cyan(),
            plan.all_stages().iter().filter(|s| !s.is_group()).count()
        );
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            let pipeline = config.to_pipeline();
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Stages: {}", style(pipeline.stage_count()).cyan());
            println!("  Parameters: {}", style(config.parameters.len()).cyan());
            println!("  Agents: {}", style(config.agents.len()).cyan());
            println!("  Timeout: {}", style(format_duration(pipeline.timeout)).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn resolve_schedule(cmd: &ScheduleCommand) -> Result<()> {
    let url = match (&cmd.url, &cmd.file) {
        (Some(url), _) => Some(url.clone()),
        (None, Some(file)) => PipelineConfig::from_file(file)
            .context("Failed to load pipeline config")?
            .schedule_url,
        (None, None) => None,
    };

    let cron = ScheduleResolver::new()
        .resolve(url.as_deref(), &cmd.branch, &cmd.job)
        .await;
    let trigger = CronTrigger::from_expression(&cron);

    println!(
        "{} Trigger for {} on {}: {}",
        INFO,
        style(&cmd.job).bold(),
        style(&cmd.branch).cyan(),
        trigger
    );
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store(false).await?;

    let Some(job) = &cmd.job else {
        let jobs = store.list_jobs().await?;
        if jobs.is_empty() {
            println!("{} No builds found in history", INFO);
        }
        for job in &jobs {
            println!("  {}", style(job).bold());
        }
        return Ok(());
    };

    let builds: Vec<BuildSummary> = store
        .list_builds(job)
        .await?
        .into_iter()
        .take(cmd.limit)
        .collect();

    if cmd.json {
        let data = serde_json::json!({ "builds": builds });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if builds.is_empty() {
        println!("{} No builds found for {}", INFO, job);
        return Ok(());
    }

    println!("{} Build history for {} (latest {}):", INFO, style(job).bold(), cmd.limit);
    for build in &builds {
        println!("  {}", format_build_summary(build));
    }

    let chain = store.history_chain(job).await?;
    match last_non_aborted(chain.as_deref()) {
        Some(record) => println!(
            "\n{} Last non-aborted build: #{} ({})",
            INFO,
            record.id,
            record
                .result
                .map(|r| r.to_string())
                .unwrap_or_else(|| "RUNNING".to_string())
        ),
        None => println!("\n{} Every build of {} was aborted", WARN, job),
    }

    Ok(())
}
