use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use geoindex::cli::commands::{handle_config, handle_index, handle_query, handle_status};
use geoindex::cli::{Cli, Commands};
use geoindex::models::{Config, OutputFormat};

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("geoindex={default_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let default_format = Config::load(cli.config.as_deref())
        .map(|config| config.search.default_format)
        .unwrap_or_default();
    let format = cli.format.unwrap_or(default_format);
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli.command, cli.config.as_deref(), format, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal; entries written so far are kept.");
        }
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    match command {
        Commands::Index(args) => {
            handle_index(args, config_path, format, verbose).await?;
        }
        Commands::Query(args) => {
            handle_query(args, config_path, format, verbose).await?;
        }
        Commands::Status => {
            handle_status(config_path, format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, config_path, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
