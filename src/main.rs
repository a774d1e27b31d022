use anyhow::{Context, Result};
use pushdeploy::cli::commands::{
    HistoryCommand, PushCommand, RunCommand, TriggerAction, TriggerCommand, TriggerCreateCommand,
    ValidateCommand,
};
use pushdeploy::cli::output::*;
use pushdeploy::cli::{exit_code, exit_code_for_error, exit_code_for_run, Cli, Command};
use pushdeploy::core::config::PipelineConfig;
use pushdeploy::execution::default_data_dir;
use pushdeploy::persistence::{create_summary, InMemoryPersistence, PersistenceBackend, SqliteStore};
use pushdeploy::{
    EngineConfig, ExecutionEngine, HostProcessRunner, PipelineRun, PushEvent, TriggerError,
    TriggerListener, TriggerOutcome, TriggerRule, Workspace,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match dispatch(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", CROSS, err);
            exit_code_for_error(&err)
        }
    };

    std::process::exit(code);
}

async fn dispatch(cli: &Cli) -> Result<i32> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &data_dir).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::History(cmd) => show_history(cmd, &data_dir, cli.verbose).await,
        Command::Trigger(cmd) => manage_triggers(cmd, &data_dir).await,
        Command::Push(cmd) => deliver_push(cmd, &data_dir).await,
    }
}

async fn open_store(data_dir: &Path, no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        Ok(Arc::new(InMemoryPersistence::new()))
    } else {
        Ok(Arc::new(SqliteStore::with_default_path(data_dir).await?))
    }
}

async fn build_engine(data_dir: &Path) -> ExecutionEngine<HostProcessRunner> {
    let config = EngineConfig::new().with_workspace_root(data_dir.join("workspaces"));
    let engine = ExecutionEngine::new(HostProcessRunner::new(), config);

    // Set up event handler for console output
    engine
        .add_event_handler(|event| {
            println!("{}", format_execution_event(&event));
        })
        .await;

    engine
}

/// Cancellation flag raised by Ctrl-C; honoured before the next step
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling after the current step");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

async fn finish_run(run: &PipelineRun, store: &dyn PersistenceBackend, persist: bool) -> Result<i32> {
    store.save_run(run).await?;
    if persist {
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(run.run_id).dim()
        );
    }

    if run.is_success() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&run.pipeline_name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&run.pipeline_name).bold(),
            format_status(run.status)
        );
        if let Some(err) = &run.error {
            println!("  {}", style(err).red());
        }
    }

    Ok(exit_code_for_run(run))
}

async fn run_pipeline(cmd: &RunCommand, data_dir: &Path) -> Result<i32> {
    let pipeline = PipelineConfig::from_file(&cmd.file)
        .and_then(|config| config.to_pipeline())
        .context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    for (key, value) in &cmd.substitutions {
        println!(
            "{} Substitution override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let mut context = pipeline.context_with(cmd.substitutions.clone());
    context.set_if_absent("BUILD_ID", Uuid::new_v4().to_string());

    let store = open_store(data_dir, cmd.no_history).await?;
    let engine = build_engine(data_dir).await;
    let cancel = cancel_on_ctrl_c();

    println!();
    let run = match &cmd.workdir {
        Some(dir) => {
            let workspace = Workspace::claim(dir).context("Failed to claim working directory")?;
            engine.run_in(&pipeline, context, &workspace, cancel).await
        }
        None => engine.run(&pipeline, context, cancel).await,
    };

    finish_run(&run, store.as_ref(), !cmd.no_history).await
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    let pipeline = PipelineConfig::from_file(&cmd.file)
        .and_then(|config| config.to_pipeline())
        .context("Validation failed")?;
    let unresolved = pipeline.variables_without_default();

    if cmd.json {
        let data = serde_json::json!({
            "valid": true,
            "name": pipeline.name,
            "steps": pipeline.steps.iter().map(|s| &s.id).collect::<Vec<_>>(),
            "substitutions": pipeline.substitutions,
            "variables_without_default": unresolved,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(exit_code::SUCCESS);
    }

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&pipeline.name).bold());
    println!("  Steps: {}", style(pipeline.steps.len()).cyan());
    for (index, step) in pipeline.steps.iter().enumerate() {
        let mut line = format!("    {}. {} ({})", index + 1, style(&step.id).cyan(), step.tool);
        if step.allow_failure {
            line.push_str(&format!(" {}", style("allow_failure").yellow()));
        }
        println!("{}", line);
    }
    println!("  Substitutions: {}", style(pipeline.substitutions.len()).cyan());

    if !unresolved.is_empty() {
        println!(
            "{} Variables without a default (must be supplied at run time): {}",
            WARN,
            style(unresolved.join(", ")).yellow()
        );
    }

    Ok(exit_code::SUCCESS)
}

async fn show_history(cmd: &HistoryCommand, data_dir: &Path, verbose: bool) -> Result<i32> {
    let store = SqliteStore::with_default_path(data_dir).await?;

    // If specific run ID is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(run) if cmd.json => println!("{}", serde_json::to_string_pretty(&run)?),
            Some(run) => print_run_details(&run, verbose),
            None => println!("{} Run not found", WARN),
        }
        return Ok(exit_code::SUCCESS);
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(exit_code::SUCCESS);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(exit_code::SUCCESS);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(exit_code::SUCCESS)
}

fn print_run_details(run: &PipelineRun, verbose: bool) {
    let summary = create_summary(run);

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(run.run_id).cyan());
    println!("  Pipeline: {}", style(&run.pipeline_name).bold());
    println!("  Status: {}", format_status(run.status));
    if let Some(trigger) = &run.trigger {
        println!("  Trigger: {}", style(trigger).cyan());
    }
    if let Some(build_id) = &summary.build_id {
        println!("  Build ID: {}", style(build_id).dim());
    }
    if let Some(dir) = &run.working_dir {
        println!("  Working dir: {}", style(dir.display()).dim());
    }
    if let Some(started) = run.started_at {
        println!("  Started: {}", style(started.to_rfc3339()).dim());
    }
    if let Some(duration) = run.duration() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!("  Steps: {}/{}", summary.completed_steps, summary.total_steps);
    if let Some(err) = &run.error {
        println!("  Error: {}", style(err).red());
    }

    println!("\n  {}", style("Step log:").bold());
    for result in &run.results {
        println!("    {}", format_step_result(result));
        println!("      {}", style(result.command.join(" ")).dim());
        if verbose {
            for (label, text) in [("stdout", &result.stdout), ("stderr", &result.stderr)] {
                if text.trim().is_empty() {
                    continue;
                }
                println!("      {}:", style(label).dim());
                for line in text.lines() {
                    println!("        {}", line);
                }
            }
        }
    }
}

async fn manage_triggers(cmd: &TriggerCommand, data_dir: &Path) -> Result<i32> {
    let store = SqliteStore::with_default_path(data_dir).await?;

    match &cmd.action {
        TriggerAction::Create(create) => {
            let rule = rule_from_args(create);
            store.create_trigger(&rule).await?;
            println!("{} Created trigger {}", CHECK, format_trigger(&rule));
        }
        TriggerAction::Describe { name, json } => {
            let rule = store
                .load_trigger(name)
                .await?
                .ok_or_else(|| TriggerError::NotFound(name.clone()))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&rule)?);
            } else {
                print_trigger_details(&rule);
            }
        }
        TriggerAction::Delete { name } => {
            store.delete_trigger(name).await?;
            println!("{} Deleted trigger {}", CHECK, style(name).bold());
        }
        TriggerAction::List { json } => {
            let rules = store.list_triggers().await?;
            if *json {
                let data = serde_json::json!({ "triggers": rules });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else if rules.is_empty() {
                println!("{} No triggers registered", INFO);
            } else {
                println!("{} Triggers:", INFO);
                for rule in &rules {
                    println!("  {}", format_trigger(rule));
                }
            }
        }
    }

    Ok(exit_code::SUCCESS)
}

fn rule_from_args(cmd: &TriggerCreateCommand) -> TriggerRule {
    // Store an absolute path so pushes resolve the pipeline from any directory
    let pipeline = std::path::absolute(&cmd.pipeline).unwrap_or_else(|_| cmd.pipeline.clone());

    let mut rule = TriggerRule::new(&cmd.name, &cmd.branch, pipeline, &cmd.service_identity);
    for (key, value) in &cmd.substitutions {
        rule = rule.with_substitution(key, value);
    }
    if let Some(description) = &cmd.description {
        rule = rule.with_description(description);
    }
    rule
}

fn print_trigger_details(rule: &TriggerRule) {
    println!("{} Trigger {}", INFO, style(&rule.name).bold());
    println!("  Branch pattern: {}", style(&rule.branch_pattern).cyan());
    println!("  Pipeline: {}", rule.pipeline.display());
    println!("  Service identity: {}", rule.service_identity);
    if let Some(description) = &rule.description {
        println!("  Description: {}", description);
    }
    for (key, value) in &rule.substitutions {
        println!("  {} = {}", style(key).cyan(), style(value).dim());
    }
}

fn read_push_event(cmd: &PushCommand) -> Result<Option<PushEvent>> {
    if let Some(path) = &cmd.payload {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload {}", path.display()))?;
        let payload: serde_json::Value =
            serde_json::from_str(&raw).context("Payload is not valid JSON")?;
        return Ok(PushEvent::from_github_payload(&payload));
    }

    match (&cmd.branch, &cmd.commit) {
        (Some(branch), Some(commit)) => Ok(Some(PushEvent::new(branch, commit))),
        _ => anyhow::bail!("either --payload or both --branch and --commit are required"),
    }
}

async fn deliver_push(cmd: &PushCommand, data_dir: &Path) -> Result<i32> {
    let Some(event) = read_push_event(cmd)? else {
        println!("{} Not a branch push, ignoring", INFO);
        return Ok(exit_code::SUCCESS);
    };

    let triggers = SqliteStore::with_default_path(data_dir).await?;
    let rules = triggers.list_triggers().await?;
    debug!("Loaded {} triggers", rules.len());

    let engine = Arc::new(build_engine(data_dir).await);
    let listener = TriggerListener::new(engine, rules)?.with_cancel_flag(cancel_on_ctrl_c());

    match listener.handle_push(&event).await? {
        TriggerOutcome::Ignored => {
            println!(
                "{} No trigger matches branch {}, nothing to do",
                INFO,
                style(&event.branch).bold()
            );
            Ok(exit_code::SUCCESS)
        }
        TriggerOutcome::Fired { rule, run } => {
            println!("{} Trigger {} fired", INFO, style(&rule).bold());
            let history: Arc<dyn PersistenceBackend> = if cmd.no_history {
                Arc::new(InMemoryPersistence::new())
            } else {
                Arc::new(triggers)
            };
            finish_run(&run, history.as_ref(), !cmd.no_history).await
        }
    }
}
