//! Typed access to the cluster through `kubectl`.
//!
//! Reads use `-o json` and deserialize into `k8s-openapi` resource types;
//! writes serialize `k8s-openapi` manifests and pipe them to `kubectl` on
//! stdin. Every invocation is bounded by a runner timeout.

use crate::platform::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::PreflightError;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Bound on a single non-waiting kubectl call
pub const KUBECTL_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Slack added to the runner timeout on top of a server-side wait
const WAIT_MARGIN: Duration = Duration::from_secs(15);

/// Label stamped on every namespace this tool creates
pub const MANAGED_BY_LABEL: (&str, &str) = ("app.kubernetes.io/managed-by", "k8s-preflight");

/// Generic `kind: List` envelope returned by `kubectl get ... -o json`
#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Version block of `kubectl version -o json`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub minor: String,
    #[serde(default)]
    pub git_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReport {
    pub client_version: Option<VersionInfo>,
    pub server_version: Option<VersionInfo>,
}

/// Result of a server-side dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunOutcome {
    Accepted,
    Rejected(String),
}

/// Result of a bounded readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

#[derive(Clone, Copy)]
pub struct Kubectl<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Kubectl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Kubectl { runner }
    }

    fn command<I, S>(args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("kubectl")
            .args(args)
            .timeout(KUBECTL_CALL_TIMEOUT)
    }

    fn get_json<T: DeserializeOwned>(&self, args: &[&str], context: &str) -> Result<T, PreflightError> {
        let output = self.runner.run_ok(&Self::command(args.iter().copied()))?;
        serde_json::from_str(&output.stdout).map_err(|e| PreflightError::parse(context, e))
    }

    fn get_list<T: DeserializeOwned>(&self, args: &[&str], context: &str) -> Result<Vec<T>, PreflightError> {
        let list: ItemList<T> = self.get_json(args, context)?;
        Ok(list.items)
    }

    pub fn version(&self, include_server: bool) -> Result<VersionReport, PreflightError> {
        if include_server {
            // Exits non-zero when the server is unreachable but still prints the client block
            let output = self.runner.run(&Self::command([
                "version",
                "-o",
                "json",
                "--request-timeout=10s",
            ]))?;
            serde_json::from_str(&output.stdout).map_err(|e| PreflightError::parse("kubectl version", e))
        } else {
            self.get_json(&["version", "--client", "-o", "json"], "kubectl client version")
        }
    }

    pub fn list_nodes(&self) -> Result<Vec<Node>, PreflightError> {
        self.get_list(&["get", "nodes", "-o", "json"], "node list")
    }

    pub fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, PreflightError> {
        self.get_list(
            &["get", "pods", "-n", namespace, "-l", selector, "-o", "json"],
            "pod list",
        )
    }

    /// Cluster-wide list of any resource, deserialized into a caller type
    pub fn list_all<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>, PreflightError> {
        self.get_list(&["get", resource, "-A", "-o", "json"], resource)
    }

    /// Whether the API server serves `resource` (e.g. `networkpolicies`)
    pub fn has_api_resource(&self, resource: &str) -> Result<bool, PreflightError> {
        let output = self
            .runner
            .run_ok(&Self::command(["api-resources", "-o", "name"]))?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .any(|name| name == resource || name.split('.').next() == Some(resource)))
    }

    pub fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, PreflightError> {
        let output = self.runner.run_ok(&Self::command([
            "get",
            "namespace",
            name,
            "--ignore-not-found",
            "-o",
            "json",
        ]))?;
        if output.stdout.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&output.stdout)
            .map(Some)
            .map_err(|e| PreflightError::parse("namespace", e))
    }

    pub fn create_namespace(&self, name: &str) -> Result<(), PreflightError> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.0.to_string(),
                    MANAGED_BY_LABEL.1.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };
        let output = self.submit(&["create", "-f", "-"], &namespace)?;
        if output.success() {
            Ok(())
        } else {
            Err(PreflightError::CommandFailed {
                command: format!("kubectl create namespace {}", name),
                message: output.error_summary(),
            })
        }
    }

    /// Delete without waiting for finalizers
    pub fn delete_namespace(&self, name: &str) -> Result<(), PreflightError> {
        self.runner.run_ok(&Self::command([
            "delete",
            "namespace",
            name,
            "--ignore-not-found",
            "--wait=false",
        ]))?;
        Ok(())
    }

    fn submit<T: Serialize>(&self, args: &[&str], manifest: &T) -> Result<CommandOutput, PreflightError> {
        let body = serde_json::to_string(manifest).map_err(|e| PreflightError::parse("manifest", e))?;
        self.runner
            .run(&Self::command(args.iter().copied()).stdin(body))
    }

    pub fn apply<T: Serialize>(&self, namespace: &str, manifest: &T) -> Result<(), PreflightError> {
        let output = self.submit(&["apply", "-n", namespace, "-f", "-"], manifest)?;
        if output.success() {
            Ok(())
        } else {
            Err(PreflightError::CommandFailed {
                command: format!("kubectl apply -n {}", namespace),
                message: output.error_summary(),
            })
        }
    }

    /// Submit for admission with `--dry-run=server`; nothing is persisted.
    pub fn dry_run<T: Serialize>(&self, namespace: &str, manifest: &T) -> Result<DryRunOutcome, PreflightError> {
        let output = self.submit(
            &["apply", "--dry-run=server", "-n", namespace, "-f", "-"],
            manifest,
        )?;
        if output.success() {
            Ok(DryRunOutcome::Accepted)
        } else {
            Ok(DryRunOutcome::Rejected(output.error_summary()))
        }
    }

    fn bounded_wait(&self, args: Vec<String>, timeout: Duration) -> Result<Readiness, PreflightError> {
        let spec = CommandSpec::new("kubectl")
            .args(args)
            .timeout(timeout + WAIT_MARGIN);
        match self.runner.run(&spec) {
            Ok(output) if output.success() => Ok(Readiness::Ready),
            Ok(output) => Ok(Readiness::NotReady(output.error_summary())),
            Err(PreflightError::Timeout { .. }) => Ok(Readiness::NotReady(format!(
                "not ready within {}s",
                timeout.as_secs()
            ))),
            Err(e) => Err(e),
        }
    }

    /// `kubectl rollout status` bounded by `timeout`
    pub fn rollout_status(&self, namespace: &str, target: &str, timeout: Duration) -> Result<Readiness, PreflightError> {
        debug!(namespace, target, timeout_secs = timeout.as_secs(), "waiting for rollout");
        self.bounded_wait(
            vec![
                "rollout".to_string(),
                "status".to_string(),
                target.to_string(),
                "-n".to_string(),
                namespace.to_string(),
                format!("--timeout={}s", timeout.as_secs()),
            ],
            timeout,
        )
    }

    /// `kubectl wait --for=condition=Ready` bounded by `timeout`
    pub fn wait_pod_ready(&self, namespace: &str, pod: &str, timeout: Duration) -> Result<Readiness, PreflightError> {
        debug!(namespace, pod, timeout_secs = timeout.as_secs(), "waiting for pod");
        self.bounded_wait(
            vec![
                "wait".to_string(),
                "--for=condition=Ready".to_string(),
                format!("pod/{}", pod),
                "-n".to_string(),
                namespace.to_string(),
                format!("--timeout={}s", timeout.as_secs()),
            ],
            timeout,
        )
    }

    /// Run a command inside a pod. Non-zero exits are returned, not raised.
    pub fn exec(&self, namespace: &str, pod: &str, command: &[String], timeout: Duration) -> Result<CommandOutput, PreflightError> {
        let spec = CommandSpec::new("kubectl")
            .args(["exec", "-n", namespace, pod, "--"])
            .args(command.iter().cloned())
            .timeout(timeout);
        self.runner.run(&spec)
    }
}

/// Label value of `key` on any object metadata
pub fn label<'m>(meta: &'m ObjectMeta, key: &str) -> Option<&'m str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeResponse, FakeRunner};

    const NODES: &str = r#"{
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {"apiVersion": "v1", "kind": "Node",
             "metadata": {"name": "node-a", "labels": {"kubernetes.io/os": "linux"}}}
        ]
    }"#;

    #[test]
    fn test_list_nodes_parses_list_envelope() {
        let runner = FakeRunner::new().on("kubectl get nodes", FakeResponse::ok(NODES));
        let nodes = Kubectl::new(&runner).list_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].metadata.name.as_deref(), Some("node-a"));
        assert_eq!(label(&nodes[0].metadata, "kubernetes.io/os"), Some("linux"));
    }

    #[test]
    fn test_list_without_items_is_empty() {
        let runner = FakeRunner::new().on(
            "kubectl get pods",
            FakeResponse::ok(r#"{"apiVersion":"v1","kind":"List"}"#),
        );
        let pods = Kubectl::new(&runner).list_pods("ns", "app=x").unwrap();
        assert!(pods.is_empty());
    }

    #[test]
    fn test_missing_namespace_is_none() {
        let runner = FakeRunner::new().on("kubectl get namespace", FakeResponse::ok(""));
        assert!(Kubectl::new(&runner).get_namespace("absent").unwrap().is_none());
    }

    #[test]
    fn test_create_namespace_sends_labeled_manifest() {
        let runner = FakeRunner::new().on("kubectl create -f -", FakeResponse::ok("namespace/x created"));
        Kubectl::new(&runner).create_namespace("preflight-x").unwrap();

        let calls = runner.calls();
        let body = calls[0].stdin.as_deref().unwrap();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["kind"], "Namespace");
        assert_eq!(value["metadata"]["name"], "preflight-x");
        assert_eq!(value["metadata"]["labels"]["app.kubernetes.io/managed-by"], "k8s-preflight");
    }

    #[test]
    fn test_dry_run_rejection_carries_reason() {
        let runner = FakeRunner::new().on(
            "kubectl apply --dry-run=server",
            FakeResponse::fail(1, "Error from server (Forbidden): violates PodSecurity \"restricted\""),
        );
        let outcome = Kubectl::new(&runner)
            .dry_run("default", &Pod::default())
            .unwrap();
        match outcome {
            DryRunOutcome::Rejected(reason) => assert!(reason.contains("PodSecurity")),
            DryRunOutcome::Accepted => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_rollout_timeout_is_not_ready() {
        let runner = FakeRunner::new().on("kubectl rollout status", FakeResponse::Timeout);
        let readiness = Kubectl::new(&runner)
            .rollout_status("ns", "daemonset/server", Duration::from_secs(5))
            .unwrap();
        assert_eq!(readiness, Readiness::NotReady("not ready within 5s".to_string()));
    }

    #[test]
    fn test_version_with_unreachable_server() {
        let runner = FakeRunner::new().on(
            "kubectl version -o json",
            FakeResponse::Output(CommandOutput {
                exit_code: Some(1),
                stdout: r#"{"clientVersion":{"major":"1","minor":"30","gitVersion":"v1.30.2"}}"#.to_string(),
                stderr: "The connection to the server was refused".to_string(),
            }),
        );
        let report = Kubectl::new(&runner).version(true).unwrap();
        assert_eq!(report.client_version.unwrap().minor, "30");
        assert!(report.server_version.is_none());
    }

    #[test]
    fn test_has_api_resource_matches_group_suffix() {
        let runner = FakeRunner::new().on(
            "kubectl api-resources",
            FakeResponse::ok("pods\nnetworkpolicies.networking.k8s.io\n"),
        );
        let kubectl = Kubectl::new(&runner);
        assert!(kubectl.has_api_resource("networkpolicies").unwrap());
        assert!(!kubectl.has_api_resource("gateways").unwrap());
    }
}
