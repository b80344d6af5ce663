use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, Credentials, OutputFormat};
use crate::services::{QueryEngine, create_backend, create_client};

/// Input that ends an interactive session.
const EXIT_COMMAND: &str = "exit";

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(help = "Query text; omit to start an interactive session")]
    pub text: Option<String>,

    #[arg(long = "top-k", short = 'k', help = "Number of studies to return")]
    pub top_k: Option<usize>,
}

pub async fn handle_query(
    args: QueryArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let credentials = Credentials::from_env(&config)?;
    let formatter = get_formatter(format);

    let top_k = args.top_k.unwrap_or(config.search.top_k as usize);
    if top_k == 0 {
        anyhow::bail!("top-k must be at least 1");
    }

    let embedder = create_client(&config.embedding, &credentials)?;
    let index = create_backend(&config.index, &credentials)
        .await
        .context("failed to connect to the vector index")?;
    let engine = QueryEngine::new(
        embedder,
        index,
        config.index.namespace.clone(),
        config.search.retry_config(),
    );

    match args.text {
        Some(text) => run_once(&engine, &text, top_k, formatter.as_ref(), verbose).await,
        None => run_interactive(&engine, top_k, formatter.as_ref(), verbose).await,
    }
}

async fn run_once(
    engine: &QueryEngine,
    text: &str,
    top_k: usize,
    formatter: &dyn Formatter,
    verbose: bool,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    search_into(engine, text, top_k, formatter, verbose, &mut stdout).await
}

async fn search_into<W>(
    engine: &QueryEngine,
    text: &str,
    top_k: usize,
    formatter: &dyn Formatter,
    verbose: bool,
    output: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if verbose {
        eprintln!("Query: \"{}\" (top {}, index {})", text, top_k, engine.index_name());
    }
    let results = engine.search(text, top_k).await;
    output
        .write_all(formatter.format_search_results(&results).as_bytes())
        .await?;
    output.flush().await?;
    Ok(())
}

async fn run_interactive(
    engine: &QueryEngine,
    top_k: usize,
    formatter: &dyn Formatter,
    verbose: bool,
) -> Result<()> {
    eprintln!("Type a query, or '{}' to quit.", EXIT_COMMAND);
    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_session(engine, input, &mut stdout, top_k, formatter, verbose).await
}

/// Prompt for queries until `exit` or end of input. Blank lines are skipped.
async fn run_session<R, W>(
    engine: &QueryEngine,
    input: R,
    output: &mut W,
    top_k: usize,
    formatter: &dyn Formatter,
    verbose: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(b"query> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == EXIT_COMMAND {
            break;
        }
        if line.is_empty() {
            continue;
        }

        search_into(engine, line, top_k, formatter, verbose, output).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::cli::output::TextFormatter;
    use crate::error::EmbeddingError;
    use crate::models::{Document, IndexEntry, Vector};
    use crate::services::embedding::{EmbeddingService, InputRole};
    use crate::services::{EmbeddingClient, InMemoryIndex};
    use crate::utils::RetryConfig;

    #[derive(Default)]
    struct RecordingEmbedder {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingService for RecordingEmbedder {
        fn model(&self) -> &str {
            "recording"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(
            &self,
            texts: &[String],
            _role: InputRole,
        ) -> Result<Vec<Vector>, EmbeddingError> {
            self.texts.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn engine(embedder: Arc<RecordingEmbedder>, index: Arc<InMemoryIndex>) -> QueryEngine {
        let client = EmbeddingClient::new(embedder, RetryConfig::new(1));
        QueryEngine::new(client, index, "ns1", RetryConfig::new(1).with_jitter(false))
    }

    fn populated_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new("gse-index"));
        let mut document = Document::new();
        document.insert("title", "Liver regeneration");
        index.insert(IndexEntry::new("GSE1", vec![1.0, 0.0], document), "ns1");
        index
    }

    #[tokio::test]
    async fn test_session_stops_at_exit() {
        console::set_colors_enabled(false);
        let embedder = Arc::new(RecordingEmbedder::default());
        let index = populated_index();
        let engine = engine(embedder.clone(), index.clone());

        let input: &[u8] = b"liver\n\n  exit  \nnever\n";
        let mut output = Vec::new();
        run_session(&engine, input, &mut output, 5, &TextFormatter, false)
            .await
            .unwrap();

        assert_eq!(*embedder.texts.lock().unwrap(), vec!["liver".to_string()]);
        assert_eq!(index.query_calls(), 1);

        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("query> ").count(), 3);
        assert!(output.contains("1. GSE1"));
        assert!(!output.contains("never"));
    }

    #[tokio::test]
    async fn test_session_ends_at_end_of_input() {
        let embedder = Arc::new(RecordingEmbedder::default());
        let index = populated_index();
        let engine = engine(embedder.clone(), index.clone());

        let input: &[u8] = b"liver\nbrain";
        let mut output = Vec::new();
        run_session(&engine, input, &mut output, 5, &TextFormatter, false)
            .await
            .unwrap();

        assert_eq!(
            *embedder.texts.lock().unwrap(),
            vec!["liver".to_string(), "brain".to_string()]
        );
        assert_eq!(index.query_calls(), 2);
    }
}
