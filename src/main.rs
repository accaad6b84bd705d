// ABOUTME: Entry point for the deckhand CLI application.
// ABOUTME: Parses arguments, sets up tracing and maps outcomes to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use deckhand::config::{self, Config};
use deckhand::deploy::DeployOptions;
use deckhand::error::Result;
use deckhand::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let code = match run(cli, mode).await {
        Ok(code) => code,
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<i32> {
    let output = Output::new(mode);
    match &cli.command {
        Some(Commands::Init {
            project,
            host,
            force,
        }) => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, project.as_deref(), host.as_deref(), *force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(0)
        }
        Some(Commands::History { count }) => {
            let config = load_config(&cli)?;
            commands::history(&config, *count, &output)?;
            Ok(0)
        }
        Some(Commands::Status) => {
            let config = load_config(&cli)?;
            commands::status(&config, &output).await?;
            Ok(0)
        }
        None => {
            let config = load_config(&cli)?;
            let args = &cli.deploy;
            let options = DeployOptions {
                method: args.method.into(),
                version: args.pin.clone(),
                skip_build: args.skip_build,
                skip_healthcheck: args.skip_healthcheck,
                no_rollback: args.no_rollback,
                skip_backup: args.skip_backup,
                dry_run: args.dry_run,
                break_lock: args.break_lock,
            };
            commands::deploy(config, options, args.force, output).await
        }
    }
}
