//! Host firewall rules and node port reachability (k3s).
//!
//! The local firewall manager (firewalld, then ufw) is asked which ports
//! it opens and each k3s port rule is looked up in that set. Independently,
//! the API server and kubelet ports of every node are probed over TCP from
//! this host.

use crate::data::requirements::{
    PortRule, Protocol, API_SERVER_PORT, CONTROL_PLANE_LABELS, K3S_PORTS, KUBELET_PORT,
};
use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::platform::command::{CommandOutput, CommandSpec};
use crate::platform::kubectl::label;
use crate::PreflightError;
use k8s_openapi::api::core::v1::Node;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const FIREWALL_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// An opened port range; `None` protocol opens both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenRange {
    first: u16,
    last: u16,
    protocol: Option<Protocol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FirewallState {
    /// An active manager and the ranges it opens
    Active { manager: &'static str, open: Vec<OpenRange> },
    /// No manager installed or none running
    Inactive,
    /// A manager is active but its rules could not be read
    Unreadable { manager: &'static str, reason: String },
}

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)(?:[:-](\d+))?(?:/(tcp|udp))?$").expect("port pattern is valid")
    })
}

fn parse_range(token: &str) -> Option<OpenRange> {
    let caps = port_regex().captures(token.trim())?;
    let first: u16 = caps.get(1)?.as_str().parse().ok()?;
    let last: u16 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => first,
    };
    let protocol = caps.get(3).map(|m| match m.as_str() {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    });
    Some(OpenRange { first, last, protocol })
}

/// `firewall-cmd --list-ports`: space separated `port[-port]/proto`
fn parse_firewalld_ports(text: &str) -> Vec<OpenRange> {
    text.split_whitespace().filter_map(parse_range).collect()
}

/// `ufw status`: rule table rows whose action is ALLOW
fn parse_ufw_rules(text: &str) -> Vec<OpenRange> {
    text.lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let target = cols.next()?;
            let action = cols.next()?;
            if !action.eq_ignore_ascii_case("ALLOW") {
                return None;
            }
            parse_range(target)
        })
        .collect()
}

fn covers(open: &[OpenRange], rule: &PortRule) -> bool {
    open.iter().any(|r| rule.covered_by(r.first, r.last, r.protocol))
}

fn run_firewall(ctx: &CheckContext<'_>, program: &str, args: &[&str]) -> Result<CommandOutput, PreflightError> {
    ctx.runner.run(
        &CommandSpec::new(program)
            .args(args.iter().copied())
            .timeout(FIREWALL_CALL_TIMEOUT),
    )
}

fn detect_firewalld(ctx: &CheckContext<'_>) -> Result<Option<FirewallState>, PreflightError> {
    let state = match run_firewall(ctx, "firewall-cmd", &["--state"]) {
        Ok(output) => output,
        Err(PreflightError::MissingTool { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    if !state.success() || state.stdout.trim() != "running" {
        debug!(state = %state.stdout.trim(), "firewalld not running");
        return Ok(None);
    }

    let ports = run_firewall(ctx, "firewall-cmd", &["--list-ports"])?;
    Ok(Some(if ports.success() {
        FirewallState::Active {
            manager: "firewalld",
            open: parse_firewalld_ports(&ports.stdout),
        }
    } else {
        FirewallState::Unreadable {
            manager: "firewalld",
            reason: ports.error_summary(),
        }
    }))
}

fn detect_ufw(ctx: &CheckContext<'_>) -> Result<Option<FirewallState>, PreflightError> {
    let status = match run_firewall(ctx, "ufw", &["status"]) {
        Ok(output) => output,
        Err(PreflightError::MissingTool { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    if !status.success() {
        return Ok(Some(FirewallState::Unreadable {
            manager: "ufw",
            reason: status.error_summary(),
        }));
    }
    if status.stdout.contains("Status: active") {
        Ok(Some(FirewallState::Active {
            manager: "ufw",
            open: parse_ufw_rules(&status.stdout),
        }))
    } else {
        Ok(None)
    }
}

fn detect(ctx: &CheckContext<'_>) -> Result<FirewallState, PreflightError> {
    if let Some(state) = detect_firewalld(ctx)? {
        return Ok(state);
    }
    Ok(detect_ufw(ctx)?.unwrap_or(FirewallState::Inactive))
}

fn audit_rules(ctx: &CheckContext<'_>, reporter: &mut Reporter) {
    let state = match detect(ctx) {
        Ok(state) => state,
        Err(e) => {
            reporter.skip(format!("firewall rules not readable: {}", e));
            return;
        }
    };

    match state {
        FirewallState::Inactive => {
            reporter.warn("no active host firewall manager (firewalld or ufw); verify network-level rules");
        }
        FirewallState::Unreadable { manager, reason } => {
            reporter.skip(format!("{} rules not readable: {}", manager, reason));
        }
        FirewallState::Active { manager, open } => {
            for rule in K3S_PORTS {
                let is_open = covers(&open, rule);
                match (is_open, rule.required) {
                    (true, _) => reporter.pass(format!("{} allows {} ({})", manager, rule, rule.purpose)),
                    (false, true) => reporter.fail(format!(
                        "{} does not allow {} ({})",
                        manager, rule, rule.purpose
                    )),
                    (false, false) => reporter.warn(format!(
                        "{} does not allow {} ({}, optional)",
                        manager, rule, rule.purpose
                    )),
                }
            }
        }
    }
}

fn internal_ip(node: &Node) -> Option<&str> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|a| a.type_ == "InternalIP")
        .map(|a| a.address.as_str())
}

fn is_control_plane(node: &Node) -> bool {
    CONTROL_PLANE_LABELS
        .iter()
        .any(|key| label(&node.metadata, key).is_some())
}

fn probe_ports(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let nodes = match ctx.kubectl().list_nodes() {
        Ok(nodes) => nodes,
        Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
        Err(e) => {
            reporter.fail(format!("cannot list nodes for port probes: {}", e));
            return Ok(());
        }
    };

    let timeout = ctx.run.tunables.http_timeout;
    for node in &nodes {
        let name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
        let Some(ip) = internal_ip(node) else {
            reporter.warn(format!("node {} has no InternalIP; ports not probed", name));
            continue;
        };

        let mut ports = Vec::with_capacity(2);
        if is_control_plane(node) {
            ports.push((API_SERVER_PORT, "API server"));
        }
        ports.push((KUBELET_PORT, "kubelet"));

        for (port, what) in ports {
            match ctx.network.tcp_connect(ip, port, timeout) {
                Ok(latency) => reporter.pass(format!(
                    "{} on {} ({}:{}) reachable in {}ms",
                    what,
                    name,
                    ip,
                    port,
                    latency.as_millis()
                )),
                Err(e) => reporter.fail(format!(
                    "{} on {} ({}:{}) unreachable: {}",
                    what, name, ip, port, e
                )),
            }
        }
    }
    Ok(())
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    audit_rules(ctx, reporter);
    probe_ports(ctx, reporter)
}
