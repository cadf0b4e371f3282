//! Result aggregation and reporting.
//!
//! Collects per-check sections in execution order and derives summary
//! statistics and the process exit status.

use crate::context::EnvironmentKind;
use crate::{StatusKind, StatusLine};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rendered for a section with no recognized status lines
pub const NO_OUTPUT_MESSAGE: &str = "no output for this section.";

/// Everything one check reported.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSection {
    pub key: String,
    pub label: String,
    pub icon: String,
    /// Recognized findings in emission order
    pub lines: Vec<StatusLine>,
    /// Full transcript, including decorative lines
    #[serde(skip)]
    pub output: String,
    pub duration_ms: u64,
}

impl CheckSection {
    /// Findings to render: the recorded lines, or a single synthesized SKIP
    /// when the check produced none.
    pub fn display_lines(&self) -> Vec<StatusLine> {
        if self.lines.is_empty() {
            vec![StatusLine::skip(NO_OUTPUT_MESSAGE)]
        } else {
            self.lines.clone()
        }
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.display_lines().iter().filter(|l| l.kind == kind).count()
    }

    pub fn has_failures(&self) -> bool {
        self.lines.iter().any(|l| l.kind == StatusKind::Fail)
    }
}

/// Result summary statistics, counted per status line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Number of checks with at least one FAIL
    pub failing_checks: usize,
    pub total_checks: usize,
    pub total_duration_ms: u64,
}

/// Validation report for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub environment: EnvironmentKind,
    pub started_at: DateTime<Utc>,
    pub sections: Vec<CheckSection>,
    pub total_duration_ms: u64,
}

impl RunReport {
    pub fn new(environment: EnvironmentKind) -> Self {
        RunReport {
            environment,
            started_at: Utc::now(),
            sections: Vec::new(),
            total_duration_ms: 0,
        }
    }

    /// Calculate summary statistics
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total_checks: self.sections.len(),
            total_duration_ms: self.total_duration_ms,
            ..Default::default()
        };

        for section in &self.sections {
            for line in section.display_lines() {
                match line.kind {
                    StatusKind::Pass => summary.passed += 1,
                    StatusKind::Warn => summary.warned += 1,
                    StatusKind::Fail => summary.failed += 1,
                    StatusKind::Skip => summary.skipped += 1,
                }
            }
            if section.has_failures() {
                summary.failing_checks += 1;
            }
        }

        summary
    }

    /// Whether any line of any section is FAIL
    pub fn has_failures(&self) -> bool {
        self.sections.iter().any(CheckSection::has_failures)
    }

    /// 1 iff at least one FAIL was observed, else 0
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_failures())
    }
}

/// Result aggregator for collecting check sections
pub struct ResultAggregator {
    report: RunReport,
}

impl ResultAggregator {
    pub fn new(environment: EnvironmentKind) -> Self {
        ResultAggregator {
            report: RunReport::new(environment),
        }
    }

    /// Add a completed section
    pub fn add_section(&mut self, section: CheckSection) {
        self.report.sections.push(section);
    }

    pub fn has_failures(&self) -> bool {
        self.report.has_failures()
    }

    /// Finish the report
    pub fn into_report(mut self, total_duration_ms: u64) -> RunReport {
        self.report.total_duration_ms = total_duration_ms;
        self.report
    }
}
