//! jobq: command-line front end of the generate_climos queue.

mod cli;
mod commands;
mod config;
mod confirm;
mod output;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::commands::Session;
use crate::config::{FlagOverrides, Settings};
use crate::confirm::{AssumeYes, Confirm, Prompt};

/// Log to stderr so stdout stays clean for listings and JSON.
fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load(
        cli.config.as_deref(),
        |key| std::env::var(key).ok(),
        FlagOverrides {
            database: cli.database.clone(),
            log_level: cli.log_level.clone(),
        },
    )
    .await?;
    init_tracing(&settings.log_level)?;

    let mut assume_yes = AssumeYes;
    let mut prompt;
    let confirm: &mut dyn Confirm = if cli.yes || cli.json {
        &mut assume_yes
    } else {
        prompt = Prompt::terminal();
        &mut prompt
    };

    let session = Session {
        settings,
        json: cli.json,
        confirm,
    };
    let report = commands::run(cli.command, session).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(report.text.as_bytes())?;
    stdout.flush()?;

    Ok(if report.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
