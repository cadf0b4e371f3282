//! Check execution orchestrator.
//!
//! Manages check registration, selection, and sequential execution.
//!
//! # Graceful Degradation
//!
//! - Check errors: Converted to a trailing FAIL line after whatever the check
//!   already reported
//! - Check panics: Caught via std::panic::catch_unwind, converted to FAIL;
//!   scoped cluster resources are released during the unwind
//! - Missing external check: Exactly one SKIP line
//! - Unknown check key in a selection: `PreflightError::Config`
//! - Empty check list: Returns empty report (not an error)
//!
//! Every registered check runs regardless of earlier failures, in
//! registration order.

use crate::checks::CheckId;
use crate::context::{EnvironmentKind, RunContext};
use crate::engine::external;
use crate::engine::reporter::Reporter;
use crate::engine::result::{CheckSection, ResultAggregator, RunReport};
use crate::platform::command::CommandRunner;
use crate::platform::kubectl::Kubectl;
use crate::platform::network::NetworkProbe;
use crate::PreflightError;
use std::any::Any;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Everything a built-in check may use
pub struct CheckContext<'a> {
    pub run: &'a RunContext,
    pub runner: &'a dyn CommandRunner,
    pub network: &'a dyn NetworkProbe,
}

impl<'a> CheckContext<'a> {
    pub fn kubectl(&self) -> Kubectl<'a> {
        Kubectl::new(self.runner)
    }

    pub fn environment(&self) -> EnvironmentKind {
        self.run.environment
    }
}

/// Signature of a built-in check
pub type CheckFn = fn(&CheckContext<'_>, &mut Reporter) -> Result<(), PreflightError>;

/// How a registered check runs
#[derive(Debug, Clone)]
pub enum CheckKind {
    Builtin {
        run: CheckFn,
        environments: &'static [EnvironmentKind],
    },
    External(PathBuf),
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Stream findings as they are produced
    pub verbose: bool,
    pub color: bool,
}

/// A registered check with its execution function
#[derive(Debug, Clone)]
pub struct RegisteredCheck {
    pub key: String,
    pub label: String,
    pub icon: String,
    pub kind: CheckKind,
}

impl RegisteredCheck {
    pub fn builtin(id: CheckId) -> Self {
        let descriptor = id.descriptor();
        RegisteredCheck {
            key: id.key().to_string(),
            label: descriptor.label.to_string(),
            icon: descriptor.icon.to_string(),
            kind: CheckKind::Builtin {
                run: descriptor.run,
                environments: descriptor.environments,
            },
        }
    }

    /// External executable; keyed by its file name
    pub fn external(path: PathBuf) -> Self {
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        RegisteredCheck {
            label: format!("External check {}", key),
            key,
            icon: "🧩".to_string(),
            kind: CheckKind::External(path),
        }
    }

    /// Environments the check does something in
    pub fn environments(&self) -> &'static [EnvironmentKind] {
        match &self.kind {
            CheckKind::Builtin { environments, .. } => environments,
            CheckKind::External(_) => &EnvironmentKind::ALL,
        }
    }
}

/// Check orchestrator
pub struct CheckOrchestrator<'a> {
    config: OrchestratorConfig,
    checks: Vec<RegisteredCheck>,
    runner: &'a dyn CommandRunner,
    network: &'a dyn NetworkProbe,
}

impl<'a> CheckOrchestrator<'a> {
    /// Create a new orchestrator with the given configuration
    pub fn new(config: OrchestratorConfig, runner: &'a dyn CommandRunner, network: &'a dyn NetworkProbe) -> Self {
        CheckOrchestrator {
            config,
            checks: Vec::new(),
            runner,
            network,
        }
    }

    /// Register checks for execution
    pub fn register_checks(&mut self, checks: Vec<RegisteredCheck>) {
        self.checks.extend(checks);
    }

    /// Register a single check
    pub fn register_check(&mut self, check: RegisteredCheck) {
        self.checks.push(check);
    }

    pub fn checks(&self) -> &[RegisteredCheck] {
        &self.checks
    }

    /// Run all registered checks
    pub fn run_all(&self, ctx: &RunContext) -> RunReport {
        self.run_checks(ctx, self.checks.iter().collect())
    }

    /// Run only the named checks, in registration order
    pub fn run_specific(&self, ctx: &RunContext, keys: &[String]) -> Result<RunReport, PreflightError> {
        self.validate_keys(keys)?;
        let selected = self.checks.iter().filter(|c| keys.contains(&c.key)).collect();
        Ok(self.run_checks(ctx, selected))
    }

    /// Run all checks except the named ones
    pub fn run_excluding(&self, ctx: &RunContext, skip_keys: &[String]) -> Result<RunReport, PreflightError> {
        self.validate_keys(skip_keys)?;
        let selected = self.checks.iter().filter(|c| !skip_keys.contains(&c.key)).collect();
        Ok(self.run_checks(ctx, selected))
    }

    fn validate_keys(&self, keys: &[String]) -> Result<(), PreflightError> {
        for key in keys {
            if !self.checks.iter().any(|c| &c.key == key) {
                let known: Vec<&str> = self.checks.iter().map(|c| c.key.as_str()).collect();
                return Err(PreflightError::Config(format!(
                    "unknown check '{}' (known: {})",
                    key,
                    known.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn run_checks(&self, ctx: &RunContext, checks: Vec<&RegisteredCheck>) -> RunReport {
        let start = Instant::now();
        let mut aggregator = ResultAggregator::new(ctx.environment);
        debug!(
            checks = ?checks.iter().map(|c| c.key.as_str()).collect::<Vec<_>>(),
            "resolved check list"
        );

        for check in checks {
            if self.config.verbose {
                println!("{} {}", check.icon, check.label);
            }
            aggregator.add_section(self.execute_check(ctx, check));
        }

        aggregator.into_report(start.elapsed().as_millis() as u64)
    }

    /// Execute a single check, converting errors and panics to FAIL lines
    fn execute_check(&self, ctx: &RunContext, check: &RegisteredCheck) -> CheckSection {
        info!(check = %check.key, "check started");
        let start = Instant::now();
        let mut reporter = if self.config.verbose {
            Reporter::live(self.config.color)
        } else {
            Reporter::new()
        };

        match &check.kind {
            CheckKind::External(path) => {
                external::run_external(path, ctx, self.runner, &mut reporter);
            }
            CheckKind::Builtin { environments, .. } if !environments.contains(&ctx.environment) => {
                reporter.skip(format!("{} does not apply to {}", check.label, ctx.environment));
            }
            CheckKind::Builtin { run, .. } => {
                let check_ctx = CheckContext {
                    run: ctx,
                    runner: self.runner,
                    network: self.network,
                };
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run(&check_ctx, &mut reporter)
                }));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => reporter.fail(error_message(&e)),
                    Err(payload) => {
                        reporter.fail(format!("unexpected error: check panicked: {}", panic_message(&payload)))
                    }
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let (lines, output) = reporter.into_parts();
        info!(check = %check.key, lines = lines.len(), duration_ms, "check finished");

        CheckSection {
            key: check.key.clone(),
            label: check.label.clone(),
            icon: check.icon.clone(),
            lines,
            output,
            duration_ms,
        }
    }
}

/// FAIL message for an error escaping a check
fn error_message(error: &PreflightError) -> String {
    match error {
        PreflightError::MissingTool { .. } => error.to_string(),
        PreflightError::Config(message) => message.clone(),
        other => format!("unexpected error: {}", other),
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Create all built-in checks in declared order
pub fn create_all_checks() -> Vec<RegisteredCheck> {
    CheckId::ALL.iter().copied().map(RegisteredCheck::builtin).collect()
}
