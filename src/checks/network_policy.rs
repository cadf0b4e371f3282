//! Default-deny NetworkPolicy audit.
//!
//! A policy denies a direction by default when it selects every pod in its
//! namespace, declares the direction in `policyTypes`, and lists no rules
//! for it. Such policies block platform traffic unless matching allow
//! policies are installed alongside, so each one is reported as a warning.

use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::PreflightError;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    fn policy_type(self) -> &'static str {
        match self {
            Direction::Ingress => "Ingress",
            Direction::Egress => "Egress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        })
    }
}

fn selects_all(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().map_or(true, |m| m.is_empty())
        && selector.match_expressions.as_ref().map_or(true, |e| e.is_empty())
}

/// Whether `policy` is a default deny for `direction`
pub fn is_default_deny(policy: &NetworkPolicy, direction: Direction) -> bool {
    let Some(spec) = &policy.spec else {
        return false;
    };
    let declared = spec
        .policy_types
        .as_ref()
        .is_some_and(|types| types.iter().any(|t| t == direction.policy_type()));
    let no_rules = match direction {
        Direction::Ingress => spec.ingress.as_ref().map_or(true, |r| r.is_empty()),
        Direction::Egress => spec.egress.as_ref().map_or(true, |r| r.is_empty()),
    };
    selects_all(&spec.pod_selector) && declared && no_rules
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let kubectl = ctx.kubectl();
    match kubectl.has_api_resource("networkpolicies") {
        Ok(true) => {}
        Ok(false) => {
            reporter.skip("NetworkPolicy API not served by this cluster");
            return Ok(());
        }
        Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
        Err(e) => {
            reporter.skip(format!("NetworkPolicy API unavailable: {}", e));
            return Ok(());
        }
    }

    let policies: Vec<NetworkPolicy> = kubectl.list_all("networkpolicies")?;

    let mut denies: BTreeMap<(String, Direction), Vec<String>> = BTreeMap::new();
    for policy in &policies {
        let namespace = policy.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = policy.metadata.name.clone().unwrap_or_default();
        for direction in [Direction::Ingress, Direction::Egress] {
            if is_default_deny(policy, direction) {
                denies
                    .entry((namespace.clone(), direction))
                    .or_default()
                    .push(name.clone());
            }
        }
    }

    if denies.is_empty() {
        reporter.pass(format!(
            "no default-deny NetworkPolicies ({} policies inspected)",
            policies.len()
        ));
        return Ok(());
    }

    for ((namespace, direction), names) in denies {
        reporter.warn(format!(
            "namespace {} denies all {} by default ({}); allow platform traffic explicitly",
            namespace,
            direction,
            names.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EnvironmentKind, RunContext};
    use crate::platform::fake::{FakeNetwork, FakeResponse, FakeRunner};
    use crate::{StatusKind, StatusLine};
    use serde_json::json;

    fn policy(ns: &str, name: &str, spec: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {"name": name, "namespace": ns},
            "spec": spec
        })
    }

    fn parse(value: serde_json::Value) -> NetworkPolicy {
        serde_json::from_value(value).unwrap()
    }

    fn run_with(runner: &FakeRunner) -> Vec<StatusLine> {
        let run_ctx = RunContext::new(EnvironmentKind::Aks);
        let network = FakeNetwork::new();
        let ctx = CheckContext {
            run: &run_ctx,
            runner,
            network: &network,
        };
        let mut reporter = Reporter::new();
        run(&ctx, &mut reporter).unwrap();
        reporter.into_parts().0
    }

    const API_RESOURCES: &str = "pods\nservices\nnetworkpolicies.networking.k8s.io\n";

    #[test]
    fn test_default_deny_rule() {
        let deny_in = parse(policy("a", "deny", json!({"podSelector": {}, "policyTypes": ["Ingress"]})));
        assert!(is_default_deny(&deny_in, Direction::Ingress));
        assert!(!is_default_deny(&deny_in, Direction::Egress));

        let selective = parse(policy(
            "a",
            "web",
            json!({"podSelector": {"matchLabels": {"app": "web"}}, "policyTypes": ["Ingress"]}),
        ));
        assert!(!is_default_deny(&selective, Direction::Ingress));

        let allow_all = parse(policy(
            "a",
            "allow",
            json!({"podSelector": {}, "policyTypes": ["Ingress", "Egress"], "ingress": [{}], "egress": []}),
        ));
        assert!(!is_default_deny(&allow_all, Direction::Ingress));
        assert!(is_default_deny(&allow_all, Direction::Egress));

        let undeclared = parse(policy("a", "x", json!({"podSelector": {}})));
        assert!(!is_default_deny(&undeclared, Direction::Ingress));
    }

    #[test]
    fn test_warns_per_namespace_and_direction() {
        let list = json!({"items": [
            policy("payments", "deny-all", json!({"podSelector": {}, "policyTypes": ["Ingress", "Egress"]})),
            policy("web", "allow-web", json!({"podSelector": {"matchLabels": {"app": "web"}}, "policyTypes": ["Ingress"], "ingress": [{}]})),
        ]});
        let runner = FakeRunner::new()
            .on("kubectl api-resources", FakeResponse::ok(API_RESOURCES))
            .on("kubectl get networkpolicies -A", FakeResponse::ok(list.to_string()));
        let lines = run_with(&runner);

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.kind == StatusKind::Warn));
        assert!(lines[0].message.starts_with("namespace payments denies all ingress"));
        assert!(lines[1].message.starts_with("namespace payments denies all egress"));
    }

    #[test]
    fn test_none_passes() {
        let runner = FakeRunner::new()
            .on("kubectl api-resources", FakeResponse::ok(API_RESOURCES))
            .on("kubectl get networkpolicies -A", FakeResponse::ok(r#"{"items": []}"#));
        let lines = run_with(&runner);
        assert_eq!(lines, vec![StatusLine::pass("no default-deny NetworkPolicies (0 policies inspected)")]);
    }

    #[test]
    fn test_api_unavailable_skips() {
        let runner = FakeRunner::new().on("kubectl api-resources", FakeResponse::ok("pods\nservices\n"));
        let lines = run_with(&runner);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, StatusKind::Skip);
        assert!(!runner.was_called("kubectl get networkpolicies"));

        let runner = FakeRunner::new().on("kubectl api-resources", FakeResponse::fail(1, "connection refused"));
        let lines = run_with(&runner);
        assert_eq!(lines[0].kind, StatusKind::Skip);
    }
}
