//! Output formatting for k8s-preflight.
//!
//! Provides terminal and JSON summary formatters.
//!
//! # Graceful Degradation
//!
//! - Non-TTY output: Color disabled via NO_COLOR or --no-color
//! - Empty reports: Produces valid output with zero checks
//! - Sections without findings: One synthesized SKIP line
//!
//! All formatters produce valid output for any RunReport input.

use crate::cli::args::OutputFormat;
use crate::engine::result::RunReport;
use crate::{StatusKind, StatusLine};
use owo_colors::OwoColorize;
use serde_json::json;

const RULE: &str = "--------------------------------------------------------------------------------";

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format a run report into a string
    fn format(&self, report: &RunReport) -> String;
}

fn paint_tag(kind: StatusKind, color: bool) -> String {
    let tag = format!("[{}]", kind);
    if !color {
        return tag;
    }
    match kind {
        StatusKind::Pass => tag.green().bold().to_string(),
        StatusKind::Warn => tag.yellow().bold().to_string(),
        StatusKind::Fail => tag.red().bold().to_string(),
        StatusKind::Skip => tag.bright_black().to_string(),
    }
}

/// A status line as printed on a terminal
pub fn paint_status(line: &StatusLine, color: bool) -> String {
    if line.message.is_empty() {
        paint_tag(line.kind, color)
    } else {
        format!("{} {}", paint_tag(line.kind, color), line.message)
    }
}

/// Terminal (human-readable) formatter
pub struct TerminalFormatter {
    color: bool,
}

impl TerminalFormatter {
    pub fn new(color: bool) -> Self {
        TerminalFormatter { color }
    }

    fn banner(&self, failing_checks: usize) -> String {
        let text = if failing_checks == 0 {
            "[PASS] preflight passed: 0 failing checks".to_string()
        } else {
            format!(
                "[FAIL] preflight failed: {} failing check{}",
                failing_checks,
                if failing_checks == 1 { "" } else { "s" }
            )
        };
        match (self.color, failing_checks) {
            (false, _) => text,
            (true, 0) => text.green().bold().to_string(),
            (true, _) => text.red().bold().to_string(),
        }
    }
}

impl OutputFormatter for TerminalFormatter {
    fn format(&self, report: &RunReport) -> String {
        let mut output = String::new();

        output.push_str(RULE);
        output.push('\n');
        output.push_str("k8s-preflight summary\n");
        output.push_str(&format!("Environment: {}\n", report.environment));
        output.push_str(&format!(
            "Started: {}\n",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(RULE);
        output.push_str("\n\n");

        for section in &report.sections {
            let heading = format!("{} {}", section.icon, section.label);
            if self.color {
                output.push_str(&heading.bold().to_string());
            } else {
                output.push_str(&heading);
            }
            output.push('\n');

            for line in section.display_lines() {
                output.push_str("  ");
                output.push_str(&paint_status(&line, self.color));
                output.push('\n');
            }
            output.push('\n');
        }

        let summary = report.summary();
        output.push_str(RULE);
        output.push('\n');
        output.push_str(&format!(
            "SUMMARY: {} passed, {} warnings, {} failed, {} skipped across {} checks\n",
            summary.passed, summary.warned, summary.failed, summary.skipped, summary.total_checks
        ));
        output.push_str(&format!(
            "Total time: {:.1}s\n",
            report.total_duration_ms as f64 / 1000.0
        ));
        output.push_str(&self.banner(summary.failing_checks));

        output
    }
}

/// JSON formatter
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        JsonFormatter { pretty }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &RunReport) -> String {
        let sections: Vec<_> = report
            .sections
            .iter()
            .map(|s| {
                json!({
                    "key": s.key,
                    "label": s.label,
                    "duration_ms": s.duration_ms,
                    "lines": s.display_lines(),
                })
            })
            .collect();

        let value = json!({
            "environment": report.environment,
            "started_at": report.started_at,
            "total_duration_ms": report.total_duration_ms,
            "summary": report.summary(),
            "exit_code": report.exit_code(),
            "sections": sections,
        });

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        rendered.unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
    }
}

/// Get a formatter based on the output format
pub fn get_formatter(format: OutputFormat, color: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TerminalFormatter::new(color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
