use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

use waypoint::errors::exit_code_for;
use waypoint::util::STATE_DIR;

mod cmd;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(version, about = "Checkpointed change pipeline with lanes, quality gates and rollback")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmations and take the default at resumption prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize waypoint in the project directory
    Init,
    /// Create a new change
    New {
        change_id: String,
        #[arg(long)]
        title: String,
        /// Defaults to $USER
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Run (or resume) the pipeline for a change
    Run {
        change_id: String,
        /// Force a lane: docs, standard or heavy
        #[arg(long)]
        lane: Option<String>,
        /// Print the plan without executing anything
        #[arg(long)]
        dry_run: bool,
        /// Do not snapshot before stages
        #[arg(long)]
        no_checkpoints: bool,
    },
    /// List checkpoints of a change, oldest first
    ListCheckpoints { change_id: String },
    /// Restore a change's files from a checkpoint
    Rollback {
        checkpoint_id: String,
        /// Owning change (found by scanning all changes when omitted)
        #[arg(long)]
        change: Option<String>,
    },
    /// Delete old checkpoints, keeping the newest
    CleanupCheckpoints {
        change_id: String,
        /// Defaults to `checkpoints.retention`
        keep: Option<usize>,
    },
    /// Show pipeline status of a change
    Status {
        change_id: String,
        #[arg(long, default_value = "tree", value_parser = ["tree", "timeline", "compact", "detailed"])]
        format: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let _log_guard =
        waypoint::logging::init_tracing(&project_dir.join(STATE_DIR).join("logs"), cli.verbose);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir),
        Commands::New {
            change_id,
            title,
            owner,
            description,
        } => cmd::cmd_new(cli, &project_dir, change_id, title, owner.as_deref(), description),
        Commands::Run {
            change_id,
            lane,
            dry_run,
            no_checkpoints,
        } => {
            cmd::cmd_run(
                cli,
                &project_dir,
                change_id,
                lane.clone(),
                *dry_run,
                *no_checkpoints,
            )
            .await
        }
        Commands::ListCheckpoints { change_id } => {
            cmd::cmd_list_checkpoints(cli, &project_dir, change_id)
        }
        Commands::Rollback {
            checkpoint_id,
            change,
        } => cmd::cmd_rollback(cli, &project_dir, checkpoint_id, change.as_deref()),
        Commands::CleanupCheckpoints { change_id, keep } => {
            cmd::cmd_cleanup_checkpoints(cli, &project_dir, change_id, *keep)
        }
        Commands::Status { change_id, format } => {
            cmd::cmd_status(cli, &project_dir, change_id, format)
        }
        Commands::Config { command } => cmd::cmd_config(cli, &project_dir, command.clone()),
    }
}
