//! Reclaim - disk space recovery for git checkouts
//!
//! Operator front end for the recovery engine: run one recovery step after a
//! disk-full failure, clean or list checkouts directly, and inspect the
//! effective configuration and retry ledger.

#![forbid(unsafe_code)]

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::{Overrides, RecoverArgs, apply_overrides, project_filter};
use reclaim_common::{LogConfig, LogFormat, ProcessExecutor, ReclaimConfig, init_logging};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "reclaim")]
#[command(author, version, about = "Reclaim disk space by resetting git checkouts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/reclaim/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Console log format: pretty or json (overrides RECLAIM_LOG_FORMAT)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Also write JSON logs to this file, rotated daily (overrides RECLAIM_LOG_FILE)
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Args)]
struct RootArgs {
    /// Directory holding every managed checkout
    #[arg(long, value_name = "DIR")]
    projects_root: Option<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only consider checkouts inside this directory (repeatable)
    #[arg(long = "include", value_name = "DIR")]
    include: Vec<String>,

    /// Skip checkouts inside this directory (repeatable)
    #[arg(long = "exclude", value_name = "DIR")]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one recovery step after a disk-full failure
    ///
    /// Exits 0 when a cleanup ran and the command should be retried, 2 when
    /// every approach was already tried, and 3 when recovery is impossible.
    Recover {
        /// Directory the failed command ran in
        #[arg(long)]
        cwd: Option<String>,

        #[command(flatten)]
        root: RootArgs,

        /// Error output of the failed command
        #[arg(long)]
        error: String,

        /// Failed command line, for the log
        #[arg(long)]
        command: Option<String>,

        /// Retry ledger to read and append to
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,

        /// Log what would be cleaned without running git
        #[arg(long)]
        dry_run: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset and clean located checkouts
    Cleanup {
        #[command(flatten)]
        root: RootArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Log what would be cleaned without running git
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// List project directories that cleanup would visit
    Locate {
        #[command(flatten)]
        root: RootArgs,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where each value came from
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Show or clear the retry ledger
    History {
        /// Retry ledger file
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,

        /// Remove every recorded retry
        #[arg(long)]
        clear: bool,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    if let Some(file) = cli.log_file.clone() {
        log_config = log_config.with_file(file);
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = ReclaimConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let mut stdout = std::io::stdout().lock();

    let code = match cli.command {
        Commands::Recover {
            cwd,
            root,
            error,
            command,
            history,
            dry_run,
            json,
        } => {
            let config = apply_overrides(
                config,
                Overrides {
                    projects_root: root.projects_root,
                    dry_run,
                    history_file: history,
                },
            );
            let args = RecoverArgs {
                cwd,
                error,
                command,
            };
            commands::recover(executor(&config), &config, &args, json, &mut stdout).await?
        }
        Commands::Cleanup {
            root,
            filter,
            dry_run,
            json,
        } => {
            let config = apply_overrides(
                config,
                Overrides {
                    projects_root: root.projects_root,
                    dry_run,
                    history_file: None,
                },
            );
            let filter = project_filter(filter.include, filter.exclude);
            commands::cleanup(executor(&config), &config, &filter, json, &mut stdout).await?
        }
        Commands::Locate { root, filter, json } => {
            let config = apply_overrides(
                config,
                Overrides {
                    projects_root: root.projects_root,
                    ..Overrides::default()
                },
            );
            let filter = project_filter(filter.include, filter.exclude);
            commands::locate(&config, &filter, json, &mut stdout)?
        }
        Commands::Config { json } => commands::show_config(&config, json, &mut stdout)?,
        Commands::History {
            history,
            clear,
            json,
        } => {
            let config = apply_overrides(
                config,
                Overrides {
                    history_file: history,
                    ..Overrides::default()
                },
            );
            commands::history(&config, clear, json, &mut stdout).await?
        }
    };

    stdout.flush()?;
    debug!(code, "Exiting");
    Ok(ExitCode::from(code))
}

fn executor(config: &ReclaimConfig) -> ProcessExecutor {
    ProcessExecutor::new().with_timeout(config.command_timeout.value)
}
