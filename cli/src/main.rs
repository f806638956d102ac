//! lintbridge CLI - binary entry point.
//!
//! Two hosts for the lint pipeline:
//!
//! ```text
//! check [--fix] FILE...   open each file once, print diagnostics, exit
//! serve                   JSON-lines editor bridge on stdin/stdout
//! ```
//!
//! Logs go to a file, never to stdout: in `serve` mode stdout carries
//! protocol data.

mod check;
mod serve;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lintbridge_config::LintBridgeConfig;
use lintbridge_lint::LintConfig;

#[derive(Parser)]
#[command(
    name = "lintbridge",
    version,
    about = "Run CSML/MCML analyzers as persistent workers and surface their diagnostics"
)]
struct Cli {
    /// Config file to use instead of ~/.lintbridge/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lint files once and print their diagnostics
    Check {
        /// Apply every available quick fix and rewrite the files
        #[arg(long)]
        fix: bool,
        /// Files to lint; the language is picked by extension
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Bridge editor events on stdin to diagnostics on stdout (JSON lines)
    Serve,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: drop logs rather than interleave them with protocol output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // ~/.lintbridge/logs/lintbridge.log
    if let Some(config_path) = LintBridgeConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("lintbridge.log"));
    }

    candidates.push(PathBuf::from(".lintbridge").join("logs").join("lintbridge.log"));

    candidates
}

fn load_config(explicit: Option<&Path>) -> Result<LintConfig> {
    let config = match explicit {
        Some(path) => Some(LintBridgeConfig::load_from(path)?),
        None => LintBridgeConfig::load()?,
    };
    Ok(config.unwrap_or_default().lint_config())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Check { fix, files } => check::run(&config, &files, fix).await,
        Command::Serve => {
            serve::run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
