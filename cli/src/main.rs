//! CLI entrypoint for conductor
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use conductor_application::{
    AgentEngine, AgentProgressNotifier, CheckpointStore, CircuitBreaker, ExecutionResult,
    NoAgentProgress, RateLimiter, RunAgentError,
};
use conductor_domain::{CheckpointId, Goal};
use conductor_infrastructure::{
    CommandTool, ConfigLoader, FileCheckpointStore, FileConfig, FileOutputFormat,
    JsonlMemoryStore, LocalProjectAnalyzer, LocalToolRegistry, TaskFilePlanner,
};
use conductor_presentation::{
    CheckpointCommand, Cli, Command, ConsoleFormatter, EngineArgs, OutputFormat, ProgressReporter,
    ResumeArgs, RunArgs, SimpleProgress,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output settings resolved from flags and `[output]`
struct DisplayOptions {
    format: OutputFormat,
    quiet: bool,
    show_progress: bool,
    verbose: bool,
}

impl DisplayOptions {
    fn progress(&self) -> Box<dyn AgentProgressNotifier> {
        if self.quiet || self.format == OutputFormat::Json {
            Box::new(NoAgentProgress)
        } else if !self.show_progress {
            Box::new(SimpleProgress)
        } else if self.verbose {
            Box::new(ProgressReporter::verbose())
        } else {
            Box::new(ProgressReporter::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    info!("Starting conductor");

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?
    };
    config.validate().context("Invalid configuration")?;

    if cli.no_color || !config.output.color {
        colored::control::set_override(false);
    }
    let display = DisplayOptions {
        format: cli.output.unwrap_or(match config.output.format {
            FileOutputFormat::Text => OutputFormat::Text,
            FileOutputFormat::Json => OutputFormat::Json,
        }),
        quiet: cli.quiet,
        show_progress: config.output.show_progress,
        verbose: cli.verbose > 0,
    };

    match cli.command {
        Command::Run(args) => run(args, &config, &display).await,
        Command::Resume(args) => resume(args, &config, &display).await,
        Command::Checkpoints(command) => checkpoints(command, &config, &display).await,
        Command::Config => show_config(cli.config.as_deref(), &config, &display),
    }
}

/// Initialize logging based on verbosity level.
///
/// `RUST_LOG` wins over `-v` when set. With `--log-file` every event is
/// also written to that file through a non-blocking writer; the returned
/// guard must live until exit so buffered lines are flushed.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

// ==================== Dependency Injection ====================

fn build_engine(
    config: &FileConfig,
    args: &EngineArgs,
    shutdown: &CancellationToken,
) -> Result<AgentEngine> {
    let mut params = config.to_execution_params();
    if args.dry_run {
        params = params.with_dry_run(true);
    }
    if let Some(max) = args.max_iterations {
        params = params.with_max_iterations(max);
    }
    if let Some(dir) = &args.working_dir {
        params = params.with_working_dir(dir.clone());
    }
    if args.no_checkpoints {
        params = params
            .with_checkpoint_every(0)
            .with_auto_save_interval(None);
    }

    let command = CommandTool::new()
        .with_timeout(Duration::from_secs(config.engine.command_timeout_secs))
        .with_change_detection(config.engine.detect_changes);
    let registry = LocalToolRegistry::new().register(Arc::new(command));

    let mut engine = AgentEngine::new(Arc::new(registry), params)?
        .with_analyzer(Arc::new(LocalProjectAnalyzer::new()))
        .with_cancellation(shutdown.clone());

    if let Some(plan) = &args.plan {
        engine = engine.with_planner(Arc::new(TaskFilePlanner::new(plan)));
    }

    if config.memory.enabled && !args.no_memory {
        let path = config.memory.resolved_path();
        match JsonlMemoryStore::open(&path) {
            Ok(store) => {
                let store = store
                    .with_recall_limit(config.memory.recall_limit)
                    .with_decisions(config.memory.record_decisions);
                engine = engine.with_memory(Arc::new(store));
            }
            Err(e) => warn!(path = %path.display(), "Memory disabled: {}", e),
        }
    }

    if config.retry.apply_to_phases {
        engine = engine.with_phase_retry(config.retry.to_retry_config());
    }
    if config.retry.apply_to_tools {
        engine = engine.with_tool_retry(config.retry.to_retry_config());
    }
    if config.rate_limit.enabled {
        let limiter = RateLimiter::new(&config.rate_limit.to_rate_limit_config());
        engine = engine.with_rate_limiter(Arc::new(limiter));
    }
    if config.circuit_breaker.enabled {
        let breaker =
            CircuitBreaker::new("collaborators", config.circuit_breaker.to_breaker_config());
        engine = engine.with_circuit_breaker(Arc::new(breaker));
    }
    if config.checkpoint.enabled {
        let store = FileCheckpointStore::new(config.checkpoint.resolved_dir());
        engine = engine.with_checkpoint_store(Arc::new(store));
    }

    engine.set_constraints(config.engine.constraints.clone());
    Ok(engine)
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });
}

// ==================== Commands ====================

async fn run(args: RunArgs, config: &FileConfig, display: &DisplayOptions) -> Result<()> {
    let shutdown = CancellationToken::new();
    let engine = build_engine(config, &args.engine, &shutdown)?;
    cancel_on_ctrl_c(shutdown);

    let mut goal = Goal::new(args.goal).with_priority(args.priority);
    for constraint in args.constraints {
        goal = goal.with_constraint(constraint);
    }
    if let Some(deadline) = args.deadline {
        goal = goal.with_deadline(deadline);
    }
    if let Some(context) = args.context {
        goal = goal.with_context(context);
    }

    let progress = display.progress();
    let outcome = engine.execute_with_progress(goal, progress.as_ref()).await;
    report(&engine, outcome, display)
}

async fn resume(args: ResumeArgs, config: &FileConfig, display: &DisplayOptions) -> Result<()> {
    if !config.checkpoint.enabled {
        bail!("Checkpoints are disabled in the configuration; nothing to resume");
    }
    let shutdown = CancellationToken::new();
    let engine = build_engine(config, &args.engine, &shutdown)?;

    let id = match args.checkpoint {
        Some(id) => CheckpointId::new(id),
        None => match engine.checkpoints().await?.pop() {
            Some(latest) => latest.id,
            None => bail!("No checkpoints to resume from"),
        },
    };
    let checkpoint = engine.restore_from_checkpoint(&id).await?;
    info!(
        checkpoint = %checkpoint.id,
        state = %checkpoint.state,
        iteration = checkpoint.iteration,
        "Restored checkpoint"
    );
    cancel_on_ctrl_c(shutdown);

    let progress = display.progress();
    let outcome = engine.resume_with_progress(progress.as_ref()).await;
    report(&engine, outcome, display)
}

/// Print the run result (also for failed runs) and turn failures into
/// a non-zero exit.
fn report(
    engine: &AgentEngine,
    outcome: Result<ExecutionResult, RunAgentError>,
    display: &DisplayOptions,
) -> Result<()> {
    let (result, error) = match outcome {
        Ok(result) => (Some(result), None),
        Err(e) => (engine.last_result(), Some(e)),
    };

    if let Some(result) = &result {
        match display.format {
            OutputFormat::Json => println!("{}", ConsoleFormatter::format_json(result)),
            OutputFormat::Text => {
                println!("{}", ConsoleFormatter::format(result));
                if display.verbose {
                    println!(
                        "{}",
                        ConsoleFormatter::format_telemetry(&engine.telemetry_summary())
                    );
                }
            }
        }
    }

    match error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn checkpoints(
    command: CheckpointCommand,
    config: &FileConfig,
    display: &DisplayOptions,
) -> Result<()> {
    let store = FileCheckpointStore::new(config.checkpoint.resolved_dir());
    match command {
        CheckpointCommand::List => {
            let checkpoints = store.list().await?;
            match display.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&checkpoints)?),
                OutputFormat::Text => {
                    print!("{}", ConsoleFormatter::format_checkpoints(&checkpoints))
                }
            }
        }
        CheckpointCommand::Show { id } => {
            let checkpoint = store.read(&CheckpointId::new(id)).await?;
            println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        }
        CheckpointCommand::Delete { id } => {
            let id = CheckpointId::new(id);
            store.delete(&id).await?;
            if !display.quiet {
                println!("Deleted {}", id);
            }
        }
    }
    Ok(())
}

fn show_config(
    explicit: Option<&Path>,
    config: &FileConfig,
    display: &DisplayOptions,
) -> Result<()> {
    if display.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Configuration sources (in priority order):");
    println!("  [ENV  ] {}*", conductor_infrastructure::config::ENV_PREFIX);
    for source in ConfigLoader::sources(explicit) {
        let mark = if source.found { "FOUND" } else { "     " };
        println!("  [{}] {:<8} {}", mark, source.label, source.path.display());
    }
    println!("  [     ] Default  built-in defaults");
    println!();
    println!("Checkpoints: {}", config.checkpoint.resolved_dir().display());
    println!("Memory:      {}", config.memory.resolved_path().display());
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
