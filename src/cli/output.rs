use std::fmt::Write as FmtWrite;

use console::style;
use serde::Serialize;

use crate::models::{OutputFormat, RunReport, SearchResults};

/// Characters of a field shown per match in text output.
const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_run_report(&self, report: &RunReport) -> String;
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub metadata_db: String,
    pub metadata_table: String,
    /// Row count, `None` when the store could not be read
    pub metadata_rows: Option<u64>,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub index_driver: String,
    pub index_name: String,
    pub namespace: String,
    pub index_connected: bool,
    pub index_exists: bool,
    pub index_dimension: Option<usize>,
    pub namespace_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TextFormatter;

impl TextFormatter {
    fn preview(value: &str) -> String {
        let preview: String = value.chars().take(PREVIEW_CHARS).collect();
        if value.chars().count() > PREVIEW_CHARS {
            format!("{}...", preview)
        } else {
            preview
        }
    }

    fn yes_no(value: bool) -> String {
        if value {
            style("[OK]").green().to_string()
        } else {
            style("[MISSING]").red().to_string()
        }
    }
}

impl Formatter for TextFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        let mut output = String::new();
        let title = if report.dry_run {
            "Dry Run"
        } else {
            "Indexing Complete"
        };
        writeln!(output, "{}", style(title).bold()).unwrap();
        writeln!(output, "{}", "-".repeat(title.len())).unwrap();
        writeln!(output, "Records loaded:     {}", report.total_records).unwrap();
        writeln!(output, "Candidates:         {}", report.total_candidates).unwrap();
        if report.skipped_without_id > 0 {
            writeln!(output, "Skipped (no id):    {}", report.skipped_without_id).unwrap();
        }
        writeln!(output, "Already indexed:    {}", report.already_indexed).unwrap();
        writeln!(output, "To process:         {}", report.to_process).unwrap();
        if !report.dry_run {
            writeln!(output, "Indexed:            {}", report.indexed).unwrap();
            let failures = format!(
                "{} embedding, {} upsert",
                report.embedding_failures, report.upsert_failures
            );
            if report.failures() > 0 {
                writeln!(output, "Failures:           {}", style(failures).yellow()).unwrap();
            } else {
                writeln!(output, "Failures:           {}", failures).unwrap();
            }
        }
        writeln!(output, "Duration:           {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, m) in results.matches.iter().enumerate() {
            writeln!(
                output,
                "{}. {} [Score: {:.3}]",
                i + 1,
                style(&m.id).cyan().bold(),
                m.score
            )
            .unwrap();
            for (field, value) in m.document.iter() {
                if value == m.id {
                    continue;
                }
                writeln!(output, "   {}: {}", style(field).dim(), Self::preview(value)).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let rows = status
            .metadata_rows
            .map_or_else(|| "unreadable".to_string(), |n| format!("{} rows", n));
        writeln!(
            output,
            "Metadata:      {} {}",
            Self::yes_no(status.metadata_rows.is_some()),
            status.metadata_db
        )
        .unwrap();
        writeln!(output, "  Table:       {} ({})", status.metadata_table, rows).unwrap();
        writeln!(output).unwrap();

        writeln!(
            output,
            "Embedding:     {} / {}",
            status.embedding_provider, status.embedding_model
        )
        .unwrap();
        writeln!(output, "  Dimension:   {}", status.embedding_dimension).unwrap();
        writeln!(output).unwrap();

        let connected = if status.index_connected {
            style("[CONNECTED]").green()
        } else {
            style("[DISCONNECTED]").red()
        };
        writeln!(output, "Index:         {} ({})", status.index_driver, connected).unwrap();
        writeln!(output, "  Name:        {}", status.index_name).unwrap();
        if status.index_connected {
            writeln!(output, "  Exists:      {}", Self::yes_no(status.index_exists)).unwrap();
            if let Some(dimension) = status.index_dimension {
                writeln!(output, "  Dimension:   {}", dimension).unwrap();
            }
            if let Some(count) = status.namespace_count {
                writeln!(output, "  Namespace:   {} ({} entries)", status.namespace, count).unwrap();
            }
        }
        if let Some(ref error) = status.error {
            writeln!(output, "  Error:       {}", style(error).red()).unwrap();
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}\n", style("Error:").red().bold(), error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut output =
            rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }
}

impl Formatter for JsonFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        self.render(report)
    }

    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        self.render(&serde_json::json!({"error": error}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
