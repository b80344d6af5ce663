//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Incremental vector indexing and semantic search over GEO study metadata.
#[derive(Debug, Parser)]
#[command(name = "geoindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'c', global = true, help = "Path to the config file")]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed and upsert every study not yet in the index
    Index(commands::IndexArgs),

    /// Retrieve the studies closest to a free-text query
    Query(commands::QueryArgs),

    /// Check metadata store and vector index status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_flags() {
        let cli = Cli::parse_from(["geoindex", "index", "--limit", "5", "--dry-run"]);
        match cli.command {
            Commands::Index(args) => {
                assert_eq!(args.limit, Some(5));
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_query_with_global_flags() {
        let cli = Cli::parse_from([
            "geoindex", "query", "liver fibrosis", "-k", "3", "--format", "json", "-v",
        ]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.verbose);
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.text.as_deref(), Some("liver fibrosis"));
                assert_eq!(args.top_k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_query_text_is_optional() {
        let cli = Cli::parse_from(["geoindex", "query"]);
        assert!(matches!(cli.command, Commands::Query(ref args) if args.text.is_none()));
    }
}
