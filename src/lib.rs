//! k8s-preflight library
//!
//! Preflight validation for Kubernetes-based platform deployments on AKS, EKS
//! and on-prem K3s clusters.
//!
//! This library provides:
//! - An immutable run context built once from flags, environment and prompts
//! - Nine built-in checks (tool versions, instance types, node labels, host
//!   firewall, inter-node connectivity, external endpoints, NetworkPolicy
//!   audit, admission dry-runs, database reachability)
//! - External check executables speaking the same `[KIND] message` protocol
//! - A sequential orchestrator and text/JSON summaries
//!
//! # Example
//!
//! ```no_run
//! use k8s_preflight::context::{EnvironmentKind, RunContext};
//! use k8s_preflight::{run_preflight, PreflightConfig};
//!
//! let ctx = RunContext::new(EnvironmentKind::K3s);
//! let report = run_preflight(&ctx, &PreflightConfig::default()).expect("preflight");
//! std::process::exit(report.exit_code().into());
//! ```

pub mod checks;
pub mod cli;
pub mod context;
pub mod data;
pub mod engine;
pub mod platform;
pub mod version;

use cli::args::Args;
use context::RunContext;
use engine::orchestrator::{create_all_checks, CheckOrchestrator, OrchestratorConfig, RegisteredCheck};
use engine::result::RunReport;
use platform::command::SystemRunner;
use platform::network::SystemNetwork;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

// Re-exports for public API
pub use engine::orchestrator::CheckOrchestrator as Orchestrator;
pub use engine::result::{CheckSection, RunReport as Report, RunSummary};

/// Kind of a reported finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl StatusKind {
    pub const ALL: [StatusKind; 4] = [
        StatusKind::Pass,
        StatusKind::Warn,
        StatusKind::Fail,
        StatusKind::Skip,
    ];

    /// Wire tag without brackets
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Pass => "PASS",
            StatusKind::Warn => "WARN",
            StatusKind::Fail => "FAIL",
            StatusKind::Skip => "SKIP",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = PreflightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(StatusKind::Pass),
            "WARN" => Ok(StatusKind::Warn),
            "FAIL" => Ok(StatusKind::Fail),
            "SKIP" => Ok(StatusKind::Skip),
            other => Err(PreflightError::Parse {
                context: "status tag".to_string(),
                message: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// One reported finding: `[KIND] message` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
}

fn status_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\[(PASS|WARN|FAIL|SKIP)\]\s?(.*)$").expect("status tag pattern is valid")
    })
}

fn ansi_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ansi pattern is valid"))
}

impl StatusLine {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        StatusLine {
            kind,
            message: message.into(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Pass, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Warn, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Fail, message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Skip, message)
    }

    /// Parse one line of check output.
    ///
    /// Returns `None` for decorative lines. Color codes and leading
    /// whitespace are tolerated.
    pub fn parse(line: &str) -> Option<StatusLine> {
        let plain = ansi_escape_regex().replace_all(line, "");
        let caps = status_tag_regex().captures(&plain)?;
        let kind = caps.get(1)?.as_str().parse().ok()?;
        let message = caps.get(2).map_or("", |m| m.as_str()).trim_end();
        Some(StatusLine::new(kind, message))
    }

    /// Extract every status line from a transcript, preserving order
    pub fn parse_all(text: &str) -> Vec<StatusLine> {
        text.lines().filter_map(StatusLine::parse).collect()
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Error types for k8s-preflight operations.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// External CLI not installed or not on PATH
    #[error("required tool '{tool}' is not installed or not on PATH")]
    MissingTool { tool: String },

    /// External command exited unsuccessfully
    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// External command exceeded its bound
    #[error("command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// Output of an external tool did not match its schema
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    /// Invalid or incomplete run configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local I/O failure
    #[error("I/O error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Network probe failure
    #[error("network error for {target}: {message}")]
    Network { target: String, message: String },
}

impl PreflightError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PreflightError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        PreflightError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Run selection and presentation settings.
#[derive(Debug, Clone, Default)]
pub struct PreflightConfig {
    /// Check keys to run (empty = all)
    pub only_checks: Vec<String>,
    /// Check keys to skip
    pub skip_checks: Vec<String>,
    /// External check executables appended after the built-in checks
    pub extra_checks: Vec<PathBuf>,
    /// Stream check output live
    pub verbose: bool,
    /// Colored live output
    pub color: bool,
}

impl PreflightConfig {
    /// Create configuration from command line arguments
    pub fn from_args(args: &Args) -> Self {
        PreflightConfig {
            only_checks: args.only.clone(),
            skip_checks: args.skip.clone(),
            extra_checks: args.extra_check.clone(),
            verbose: args.verbose,
            color: args.color_enabled(),
        }
    }
}

/// Build an orchestrator with every built-in check plus the configured
/// external checks registered in declared order.
pub fn build_orchestrator<'a>(
    config: &PreflightConfig,
    runner: &'a dyn platform::command::CommandRunner,
    network: &'a dyn platform::network::NetworkProbe,
) -> CheckOrchestrator<'a> {
    let orch_config = OrchestratorConfig {
        verbose: config.verbose,
        color: config.color,
    };

    let mut orchestrator = CheckOrchestrator::new(orch_config, runner, network);
    orchestrator.register_checks(create_all_checks());
    for path in &config.extra_checks {
        orchestrator.register_check(RegisteredCheck::external(path.clone()));
    }
    orchestrator
}

/// Run preflight checks against live cluster and cloud state.
///
/// Returns the report for the selected checks, or a `PreflightError` when
/// the selection names an unknown check or the platform layer cannot be
/// initialized.
pub fn run_preflight(ctx: &RunContext, config: &PreflightConfig) -> Result<RunReport, PreflightError> {
    let runner = SystemRunner::new();
    let network = SystemNetwork::new()?;
    let orchestrator = build_orchestrator(config, &runner, &network);

    if !config.only_checks.is_empty() {
        orchestrator.run_specific(ctx, &config.only_checks)
    } else if !config.skip_checks.is_empty() {
        orchestrator.run_excluding(ctx, &config.skip_checks)
    } else {
        Ok(orchestrator.run_all(ctx))
    }
}
