//! Renderer module
//!
//! Renders a ScanReport to different output formats: text, json, jsonl, md.
//! Key groups always follow the search key input order.

use colored::Colorize;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::core::field::POLICY_COLUMNS;
use crate::core::model::{KeyResult, ScanReport};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Jsonl,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::Jsonl),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Render configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    pub pretty: bool,
    pub color: bool,
}

impl RenderConfig {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            pretty: false,
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Renderer for scan reports
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    #[allow(dead_code)]
    pub fn new(format: OutputFormat) -> Self {
        Self {
            config: RenderConfig::new(format),
        }
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render a report to a string
    pub fn render(&self, report: &ScanReport) -> String {
        match self.config.format {
            OutputFormat::Text => self.render_text(report),
            OutputFormat::Json => self.render_json(report),
            OutputFormat::Jsonl => self.render_jsonl(report),
            OutputFormat::Markdown => self.render_markdown(report),
        }
    }

    /// Render to a writer
    pub fn render_to<W: Write>(&self, report: &ScanReport, mut writer: W) -> std::io::Result<()> {
        let mut output = self.render(report);
        if !output.ends_with('\n') {
            output.push('\n');
        }
        writer.write_all(output.as_bytes())?;
        writer.flush()
    }

    /// Write the report to a local file, creating parent directories
    pub fn write_report(&self, report: &ScanReport, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        self.render_to(report, std::io::BufWriter::new(file))
    }

    fn render_text(&self, report: &ScanReport) -> String {
        let columns = format!("positions {}-{}", POLICY_COLUMNS.start, POLICY_COLUMNS.end);
        let mut output = String::new();

        output.push_str(&format!("Scanned {} objects.", report.stats.scanned));
        if report.stats.failed > 0 {
            let failed = format!(" ({} could not be read)", report.stats.failed);
            output.push_str(&self.paint(&failed, |s| s.yellow().to_string()));
        }
        output.push('\n');

        for result in &report.results {
            if result.objects.is_empty() {
                let line = format!(
                    "No files found with policy '{}' in {}.",
                    result.key, columns
                );
                output.push_str(&self.paint(&line, |s| s.dimmed().to_string()));
                output.push('\n');
                continue;
            }

            let header = format!(
                "Found {} file(s) containing policy '{}' in {}:",
                result.objects.len(),
                result.key,
                columns
            );
            output.push_str(&self.paint(&header, |s| s.green().bold().to_string()));
            output.push('\n');
            for object in &result.objects {
                output.push_str(object);
                output.push('\n');
            }
        }

        output.trim_end().to_string()
    }

    fn render_json(&self, report: &ScanReport) -> String {
        if self.config.pretty {
            serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
        }
    }

    /// One line per search key, followed by a summary line
    fn render_jsonl(&self, report: &ScanReport) -> String {
        let mut lines: Vec<String> = report
            .results
            .iter()
            .filter_map(|result: &KeyResult| serde_json::to_string(result).ok())
            .collect();

        let summary = serde_json::json!({
            "bucket": report.bucket,
            "prefix": report.prefix,
            "stats": report.stats,
        });
        lines.push(summary.to_string());
        lines.join("\n")
    }

    fn render_markdown(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Scan of `{}`", report.bucket));
        if !report.prefix.is_empty() {
            output.push_str(&format!(" under `{}`", report.prefix));
        }
        output.push_str("\n\n");
        output.push_str(&format!(
            "- Objects scanned: {}\n- Unreadable objects: {}\n- Generated: {}\n\n",
            report.stats.scanned,
            report.stats.failed,
            report.generated_at.to_rfc3339()
        ));

        for result in &report.results {
            output.push_str(&format!("## `{}`\n\n", result.key));
            if result.objects.is_empty() {
                output.push_str("_No matches._\n\n");
                continue;
            }
            for object in &result.objects {
                output.push_str(&format!("- `{}`\n", object));
            }
            output.push('\n');
        }

        output.trim_end().to_string()
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> String) -> String {
        if self.config.color {
            style(text)
        } else {
            text.to_string()
        }
    }
}
