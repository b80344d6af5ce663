//! Index command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, Credentials, OutputFormat};
use crate::services::{
    DocumentBuilder, Pipeline, RunOptions, SqliteMetadataStore, create_backend, create_client,
};

#[derive(Debug, Args)]
pub struct IndexArgs {
    #[arg(long, short = 'n', help = "Read at most N rows from the metadata table")]
    pub limit: Option<usize>,

    #[arg(long, help = "Show what would be embedded without embedding anything")]
    pub dry_run: bool,
}

pub async fn handle_index(
    args: IndexArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let credentials = Credentials::from_env(&config)?;
    let formatter = get_formatter(format);

    let store = SqliteMetadataStore::from_config(&config.metadata)?;
    let embedder = create_client(&config.embedding, &credentials)?;
    let index = create_backend(&config.index, &credentials)
        .await
        .context("failed to connect to the vector index")?;

    if verbose {
        eprintln!("Metadata: {} ({})", store.path().display(), store.table());
        eprintln!(
            "Index:    {} {} / {}",
            config.index.driver, config.index.name, config.index.namespace
        );
        eprintln!(
            "Model:    {} ({} dims)",
            embedder.model(),
            embedder.dimension()
        );
    }

    let pipeline = Pipeline::new(
        Arc::new(store),
        DocumentBuilder::from_config(&config.document),
        embedder,
        index,
        config.index.namespace.clone(),
        config.embedding.retry_config(),
    );

    let options = RunOptions {
        limit: args.limit.or(config.metadata.limit),
        dry_run: args.dry_run,
        show_progress: format == OutputFormat::Text && console::user_attended_stderr(),
    };

    let report = pipeline.run(&options).await.context("indexing run failed")?;
    print!("{}", formatter.format_run_report(&report));

    if report.failures() > 0 {
        eprintln!(
            "Warning: {} records failed; rerun to retry them.",
            report.failures()
        );
    }

    Ok(())
}
