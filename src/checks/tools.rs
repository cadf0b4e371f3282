//! CLI tool version checks.
//!
//! kubectl is compared at major.minor granularity, helm/az/aws as full
//! versions. A missing tool or one below its minimum is FAIL; a version
//! that cannot be read is WARN.

use crate::data::versions::{requirements_for, Granularity, Tool, ToolRequirement, Version, MAX_KUBECTL_SKEW};
use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::platform::command::CommandSpec;
use crate::PreflightError;
use std::time::Duration;
use tracing::debug;

const VERSION_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw version text reported by `tool`
fn version_text(ctx: &CheckContext<'_>, tool: Tool) -> Result<String, PreflightError> {
    match tool {
        Tool::Kubectl => {
            let report = ctx.kubectl().version(false)?;
            report
                .client_version
                .map(|v| v.git_version)
                .ok_or_else(|| PreflightError::parse("kubectl version", "no clientVersion block"))
        }
        Tool::Helm => {
            let out = ctx.runner.run_ok(
                &CommandSpec::new("helm")
                    .args(["version", "--template", "{{.Version}}"])
                    .timeout(VERSION_CALL_TIMEOUT),
            )?;
            Ok(out.stdout.trim().to_string())
        }
        Tool::Az => {
            let out = ctx.runner.run_ok(
                &CommandSpec::new("az")
                    .args(["version", "-o", "json"])
                    .timeout(VERSION_CALL_TIMEOUT),
            )?;
            let value: serde_json::Value =
                serde_json::from_str(&out.stdout).map_err(|e| PreflightError::parse("az version", e))?;
            value
                .get("azure-cli")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| PreflightError::parse("az version", "no azure-cli entry"))
        }
        Tool::Aws => {
            let out = ctx.runner.run_ok(
                &CommandSpec::new("aws")
                    .arg("--version")
                    .timeout(VERSION_CALL_TIMEOUT),
            )?;
            // aws-cli v1 prints its version on stderr
            Ok(format!("{} {}", out.stdout.trim(), out.stderr.trim()).trim().to_string())
        }
    }
}

/// Check one tool; returns the detected version when readable
fn check_requirement(ctx: &CheckContext<'_>, req: &ToolRequirement, reporter: &mut Reporter) -> Option<Version> {
    let name = req.tool.program();
    let minimum = req.minimum.display(req.granularity);

    let text = match version_text(ctx, req.tool) {
        Ok(text) => text,
        Err(PreflightError::MissingTool { .. }) => {
            reporter.fail(format!("{} is not installed or not on PATH (minimum {})", name, minimum));
            return None;
        }
        Err(e) => {
            reporter.warn(format!("could not determine {} version: {}", name, e));
            return None;
        }
    };
    debug!(tool = name, raw = %text, "tool version");

    let Some(found) = Version::find(&text) else {
        reporter.warn(format!("unrecognized {} version output '{}'", name, text));
        return None;
    };

    let shown = found.display(req.granularity);
    if found.meets(&req.minimum, req.granularity) {
        reporter.pass(format!("{} {} meets minimum {}", name, shown, minimum));
    } else {
        reporter.fail(format!("{} {} is below minimum {}", name, shown, minimum));
    }
    Some(found)
}

fn check_kubectl_skew(ctx: &CheckContext<'_>, client: &Version, reporter: &mut Reporter) {
    let server = match ctx.kubectl().version(true) {
        Ok(report) => report.server_version,
        Err(e) => {
            debug!(error = %e, "server version unavailable");
            None
        }
    };

    let Some(server) = server.and_then(|s| Version::find(&s.git_version)) else {
        reporter.warn("API server unreachable; kubectl client/server skew not checked");
        return;
    };

    let client_mm = client.display(Granularity::MajorMinor);
    let server_mm = server.display(Granularity::MajorMinor);
    match client.minor_skew(&server) {
        Some(skew) if skew <= MAX_KUBECTL_SKEW => reporter.pass(format!(
            "kubectl client {} is within supported skew of server {}",
            client_mm, server_mm
        )),
        _ => reporter.warn(format!(
            "kubectl client {} and server {} differ by more than {} minor version",
            client_mm, server_mm, MAX_KUBECTL_SKEW
        )),
    }
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    for req in requirements_for(ctx.environment()) {
        let found = check_requirement(ctx, req, reporter);
        if let (Tool::Kubectl, Some(client)) = (req.tool, found) {
            check_kubectl_skew(ctx, &client, reporter);
        }
    }
    Ok(())
}
