//! Node readiness, platform labels and pool taints.

use crate::data::allowlists::{pool_matches, POOLS};
use crate::data::requirements::{
    pool_label_key, ARCH_LABEL, BLOCKING_EFFECTS, EXPECTED_ARCH, OS_LABEL, PROXY_TAINT,
};
use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::platform::kubectl::label;
use crate::PreflightError;
use k8s_openapi::api::core::v1::{Node, Taint};

/// Taints the kubelet and node lifecycle controller manage themselves
const SYSTEM_TAINT_PREFIX: &str = "node.kubernetes.io/";

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("<unnamed>")
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}

fn is_cordoned(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

fn taints(node: &Node) -> &[Taint] {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_deref())
        .unwrap_or(&[])
}

fn has_proxy_taint(node: &Node) -> bool {
    taints(node).iter().any(|t| {
        t.key == PROXY_TAINT.key
            && t.value.as_deref() == Some(PROXY_TAINT.value)
            && t.effect == PROXY_TAINT.effect
    })
}

fn blocking_taints(node: &Node) -> Vec<String> {
    taints(node)
        .iter()
        .filter(|t| BLOCKING_EFFECTS.contains(&t.effect.as_str()) && !t.key.starts_with(SYSTEM_TAINT_PREFIX))
        .map(|t| match &t.value {
            Some(v) => format!("{}={}:{}", t.key, v, t.effect),
            None => format!("{}:{}", t.key, t.effect),
        })
        .collect()
}

fn check_node(node: &Node, reporter: &mut Reporter) {
    let name = node_name(node);
    if !is_ready(node) {
        reporter.fail(format!("node {} is not Ready", name));
    }
    if is_cordoned(node) {
        reporter.warn(format!("node {} is cordoned (unschedulable)", name));
    }

    for key in [OS_LABEL, ARCH_LABEL] {
        if label(&node.metadata, key).is_none() {
            reporter.fail(format!("node {} is missing label {}", name, key));
        }
    }
    if let Some(arch) = label(&node.metadata, ARCH_LABEL) {
        if arch != EXPECTED_ARCH {
            reporter.warn(format!("node {} has architecture {}; images target {}", name, arch, EXPECTED_ARCH));
        }
    }
}

fn check_pool(pool: &str, nodes: &[&Node], reporter: &mut Reporter) {
    let mut conforming = true;
    for node in nodes {
        let name = node_name(node);
        match pool {
            "proxy" if !has_proxy_taint(node) => {
                conforming = false;
                reporter.warn(format!("proxy node {} is missing taint {}", name, PROXY_TAINT));
            }
            "workers" => {
                let blocking = blocking_taints(node);
                if !blocking.is_empty() {
                    conforming = false;
                    reporter.warn(format!(
                        "worker node {} carries unexpected taints {}",
                        name,
                        blocking.join(", ")
                    ));
                }
            }
            _ => {}
        }
    }

    if conforming {
        reporter.pass(format!("{} pool: {} node(s) labeled and tainted as expected", pool, nodes.len()));
    }
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let nodes = match ctx.kubectl().list_nodes() {
        Ok(nodes) => nodes,
        Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
        Err(e) => {
            reporter.fail(format!("cannot list nodes: {}", e));
            return Ok(());
        }
    };
    if nodes.is_empty() {
        reporter.fail("cluster reports no nodes");
        return Ok(());
    }

    for node in &nodes {
        check_node(node, reporter);
    }
    if !reporter.has_failures() {
        reporter.pass(format!("{} node(s) Ready with os/arch labels", nodes.len()));
    }

    let pool_key = pool_label_key(ctx.environment());
    for pool in POOLS {
        let members: Vec<&Node> = nodes
            .iter()
            .filter(|n| label(&n.metadata, pool_key).is_some_and(|v| pool_matches(v, pool)))
            .collect();
        if members.is_empty() {
            reporter.skip(format!("no nodes labeled {} for pool {}", pool_key, pool));
        } else {
            check_pool(pool, &members, reporter);
        }
    }
    Ok(())
}
