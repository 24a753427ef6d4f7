//! CLI command definitions

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use conductor_domain::Priority;
use std::path::PathBuf;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON output
    Json,
}

/// CLI arguments for conductor
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about = "Autonomous agent execution engine")]
#[command(long_about = r#"
Conductor drives a goal through a perceive, plan, act, review and reflect
loop, running each planned task with a local tool and checkpointing as it
goes so an interrupted run can be resumed.

Configuration files are loaded from (in priority order):
1. CONDUCTOR_* environment variables (e.g. CONDUCTOR_ENGINE__MAX_ITERATIONS=10)
2. --config <path>       Explicit config file
3. ./conductor.toml      Project-level config
4. ~/.config/conductor/config.toml   Global config

Example:
  conductor run "cargo test" --dry-run
  conductor run "release prep" --plan tasks.toml --constraint "no_delete:Cargo.lock"
  conductor resume
  conductor checkpoints list
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format (overrides [output] format)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a goal to completion
    Run(RunArgs),

    /// Resume from the latest (or a given) checkpoint
    Resume(ResumeArgs),

    /// Inspect saved checkpoints
    #[command(subcommand)]
    Checkpoints(CheckpointCommand),

    /// Show configuration sources and the effective configuration
    Config,
}

/// Options shared by `run` and `resume`
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Load the plan from a TOML or JSON task file
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Synthesize task results instead of running tools
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum loop iterations
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Working directory for tools
    #[arg(short = 'C', long, value_name = "DIR")]
    pub working_dir: Option<String>,

    /// Do not save checkpoints during this run
    #[arg(long)]
    pub no_checkpoints: bool,

    /// Do not read or write long-term memory
    #[arg(long)]
    pub no_memory: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What the agent should achieve
    pub goal: String,

    /// Goal priority (low, medium, high, critical)
    #[arg(short, long, value_parser = parse_priority, default_value = "medium")]
    pub priority: Priority,

    /// Constraint rule, e.g. `no_delete:*.lock` (repeatable)
    #[arg(short = 'c', long = "constraint", value_name = "RULE")]
    pub constraints: Vec<String>,

    /// Project directory to analyze (defaults to the working directory)
    #[arg(long, value_name = "DIR")]
    pub context: Option<String>,

    /// RFC 3339 deadline, e.g. 2026-01-31T18:00:00Z
    #[arg(long, value_parser = parse_deadline)]
    pub deadline: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Checkpoint to restore (defaults to the most recent)
    #[arg(long, value_name = "ID")]
    pub checkpoint: Option<String>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommand {
    /// List saved checkpoints, oldest first
    List,

    /// Show one checkpoint as JSON
    Show { id: String },

    /// Delete a checkpoint
    Delete { id: String },
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: conductor_domain::DomainError| e.to_string())
}

fn parse_deadline(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid deadline '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "conductor",
            "-vv",
            "run",
            "fix bug",
            "--priority",
            "high",
            "-c",
            "no_delete:*.lock",
            "--dry-run",
            "--deadline",
            "2026-01-31T18:00:00Z",
            "-o",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.goal, "fix bug");
        assert_eq!(args.priority, Priority::High);
        assert_eq!(args.constraints, vec!["no_delete:*.lock"]);
        assert!(args.engine.dry_run);
        assert!(args.deadline.is_some());
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Cli::try_parse_from(["conductor", "run", "x", "-p", "urgent"]).is_err());
        assert!(Cli::try_parse_from(["conductor", "run", "x", "--deadline", "tomorrow"]).is_err());
    }

    #[test]
    fn test_parse_checkpoint_commands() {
        let cli = Cli::try_parse_from(["conductor", "checkpoints", "delete", "checkpoint_1_0"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Checkpoints(CheckpointCommand::Delete { ref id }) if id == "checkpoint_1_0"
        ));

        let cli = Cli::try_parse_from(["conductor", "resume", "--no-memory"]).unwrap();
        let Command::Resume(args) = cli.command else {
            panic!("expected resume");
        };
        assert!(args.checkpoint.is_none());
        assert!(args.engine.no_memory);
    }
}
