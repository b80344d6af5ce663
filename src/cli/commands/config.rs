use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{
    Config, DATABASE_URL_ENV, EMBEDDING_API_KEY_ENV, OutputFormat, PINECONE_API_KEY_ENV,
    QDRANT_API_KEY_ENV,
};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with default values")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    config_path: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(config_path, force, format),
        ConfigCommand::Show => handle_show(config_path, format),
        ConfigCommand::Path => handle_path(config_path, format),
    }
}

fn resolve_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path
        .map(Path::to_path_buf)
        .or_else(Config::config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(config_path: Option<&Path>, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = resolve_path(config_path)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save(&path)
        .context("failed to write config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = Config::load(config_path)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let path = resolve_path(config_path)?;
    if path.exists() {
        println!("# Loaded from: {}", path.display());
    } else {
        println!("# Defaults (no file at {})", path.display());
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    println!();

    println!("# Credentials are read from the environment:");
    for key in [
        PINECONE_API_KEY_ENV,
        EMBEDDING_API_KEY_ENV,
        QDRANT_API_KEY_ENV,
        DATABASE_URL_ENV,
    ] {
        let state = match std::env::var(key) {
            Ok(value) if !value.trim().is_empty() => "set",
            _ => "unset",
        };
        println!("#   {} ({})", key, state);
    }
    Ok(())
}

fn handle_path(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = resolve_path(config_path)?;
    let exists = path.exists();

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "path": path,
            "exists": exists,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if exists {
        println!("{} (active)", path.display());
    } else {
        println!("{} (not created; run `geoindex config init`)", path.display());
    }
    Ok(())
}
