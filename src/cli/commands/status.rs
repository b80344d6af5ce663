use std::path::Path;

use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, Credentials, OutputFormat};
use crate::services::{SqliteMetadataStore, create_backend};

pub async fn handle_status(
    config_path: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let formatter = get_formatter(format);

    let metadata_rows = SqliteMetadataStore::from_config(&config.metadata)
        .and_then(|store| store.count())
        .ok();

    let mut status = StatusInfo {
        metadata_db: config.metadata.db_path.display().to_string(),
        metadata_table: config.metadata.table.clone(),
        metadata_rows,
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
        index_driver: config.index.driver.to_string(),
        index_name: config.index.name.clone(),
        namespace: config.index.namespace.clone(),
        index_connected: false,
        index_exists: false,
        index_dimension: None,
        namespace_count: None,
        error: None,
    };

    let backend = match Credentials::from_env(&config) {
        Ok(credentials) => create_backend(&config.index, &credentials)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match backend {
        Ok(index) => match index.describe().await {
            Ok(info) => {
                status.index_connected = true;
                status.index_exists = info.is_some();
                status.index_dimension = info.map(|i| i.dimension);
                if status.index_exists {
                    status.namespace_count =
                        index.namespace_count(&config.index.namespace).await.ok();
                }
            }
            Err(e) => status.error = Some(e.to_string()),
        },
        Err(e) => status.error = Some(e),
    }

    print!("{}", formatter.format_status(&status));

    if let Some(dimension) = status.index_dimension
        && dimension != config.embedding.dimension as usize
    {
        eprintln!(
            "Warning: index dimension {} does not match embedding dimension {}.",
            dimension, config.embedding.dimension
        );
    }
    if status.metadata_rows.is_none() {
        eprintln!("Hint: set [metadata] db_path in the config file to the SQLite metadata store.");
    }

    Ok(())
}
