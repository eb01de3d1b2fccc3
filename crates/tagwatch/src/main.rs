//! Tagwatch command-line launcher
//!
//! Runs one command on a current-thread Tokio runtime. Watching commands
//! (`watch`, `add-files`, `run`) stay in the foreground until Ctrl-C and then
//! shut the service down cleanly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tagwatch_db::DirectoryId;
use tagwatch_logging::{init_logging, LogConfig, RotationPolicy};

mod cli;

use cli::tag::TagCommand;
use cli::CliContext;

#[derive(Parser, Debug)]
#[command(name = "tagwatch", about = "Keep a tagging catalog in sync with your files")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.tagwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database, overriding the config file
    #[arg(long, global = true, env = "TAGWATCH_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a directory, index it and watch it until Ctrl-C
    Watch {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Watch individual files until Ctrl-C
    AddFiles {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Resume every persisted watch until Ctrl-C
    Run,
    /// Re-index a directory, pruning files that are gone
    Rescan {
        id: DirectoryId,
        #[arg(long)]
        json: bool,
    },
    /// Turn watching of a directory on or off
    Toggle { id: DirectoryId },
    /// Remove a directory and all of its files from the catalog
    Remove { id: DirectoryId },
    /// List watched directories
    Dirs {
        #[arg(long)]
        json: bool,
    },
    /// List cataloged files
    Files {
        /// Only files carrying this tag
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommand,
    },
    /// Show catalog counts and settings
    Info {
        #[arg(long)]
        json: bool,
    },
}

async fn run_command(ctx: CliContext, command: Commands) -> Result<()> {
    match command {
        Commands::Watch { path, json } => cli::watch::run_watch(&ctx, path, json).await,
        Commands::AddFiles { paths, json } => cli::watch::run_add_files(&ctx, paths, json).await,
        Commands::Run => cli::watch::run_resume(&ctx).await,
        Commands::Rescan { id, json } => cli::watch::run_rescan(&ctx, id, json).await,
        Commands::Toggle { id } => cli::watch::run_toggle(&ctx, id).await,
        Commands::Remove { id } => cli::watch::run_remove(&ctx, id).await,
        Commands::Dirs { json } => cli::catalog::run_dirs(&ctx, json).await,
        Commands::Files { tag, json } => cli::catalog::run_files(&ctx, tag, json).await,
        Commands::Tag { command } => cli::tag::run(&ctx, command).await,
        Commands::Info { json } => cli::catalog::run_info(&ctx, json).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "tagwatch",
        verbose: cli.verbose,
        rotation: RotationPolicy::default(),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:?}", err);
            None
        }
    };

    let ctx = CliContext {
        config_path: cli.config,
        database: cli.database,
    };

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")
        .and_then(|runtime| runtime.block_on(run_command(ctx, cli.command)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
