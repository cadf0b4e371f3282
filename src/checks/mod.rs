//! Built-in checks.
//!
//! Each check inspects one readiness concern and reports findings through
//! its `Reporter`:
//! - tools: CLI tool versions
//! - instance-types: node pool machine types against allow-lists
//! - node-labels: node readiness, labels and taints
//! - firewall: host firewall rules and node port reachability (k3s)
//! - connectivity: pod-to-pod mesh across nodes (k3s)
//! - endpoints: outbound reachability of required external endpoints
//! - network-policy: default-deny NetworkPolicy audit
//! - admission: dry-run of privileged workload shapes
//! - database: in-cluster database reachability
//!
//! # Graceful Degradation
//!
//! - Wrong environment: SKIP only (enforced by the orchestrator)
//! - Resource or feature absent: SKIP
//! - Missing tool or unreachable target: FAIL with a hint
//! - Unexpected errors: returned to the orchestrator, which appends a FAIL

pub mod admission;
pub mod connectivity;
pub mod database;
pub mod endpoints;
pub mod firewall;
pub mod instance_types;
pub mod network_policy;
pub mod node_labels;
pub mod tools;

use crate::context::EnvironmentKind;
use crate::engine::orchestrator::CheckFn;
use crate::platform::kubectl::Kubectl;
use crate::PreflightError;
use std::fmt;
use std::time::Duration;

/// Identifier of a built-in check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckId {
    Tools,
    InstanceTypes,
    NodeLabels,
    Firewall,
    Connectivity,
    Endpoints,
    NetworkPolicy,
    Admission,
    Database,
}

/// Static description of a built-in check
#[derive(Debug, Clone, Copy)]
pub struct CheckDescriptor {
    pub label: &'static str,
    pub icon: &'static str,
    pub run: CheckFn,
    /// Environments the check applies to; elsewhere it only SKIPs
    pub environments: &'static [EnvironmentKind],
}

const ALL_ENVS: &[EnvironmentKind] = &EnvironmentKind::ALL;
const CLOUD: &[EnvironmentKind] = &[EnvironmentKind::Aks, EnvironmentKind::Eks];
const ON_PREM: &[EnvironmentKind] = &[EnvironmentKind::K3s];

impl CheckId {
    /// Declared execution order
    pub const ALL: [CheckId; 9] = [
        CheckId::Tools,
        CheckId::InstanceTypes,
        CheckId::NodeLabels,
        CheckId::Firewall,
        CheckId::Connectivity,
        CheckId::Endpoints,
        CheckId::NetworkPolicy,
        CheckId::Admission,
        CheckId::Database,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CheckId::Tools => "tools",
            CheckId::InstanceTypes => "instance-types",
            CheckId::NodeLabels => "node-labels",
            CheckId::Firewall => "firewall",
            CheckId::Connectivity => "connectivity",
            CheckId::Endpoints => "endpoints",
            CheckId::NetworkPolicy => "network-policy",
            CheckId::Admission => "admission",
            CheckId::Database => "database",
        }
    }

    pub fn from_key(key: &str) -> Option<CheckId> {
        CheckId::ALL.into_iter().find(|id| id.key() == key)
    }

    pub fn descriptor(self) -> CheckDescriptor {
        match self {
            CheckId::Tools => CheckDescriptor {
                label: "CLI tool versions",
                icon: "🧰",
                run: tools::run,
                environments: ALL_ENVS,
            },
            CheckId::InstanceTypes => CheckDescriptor {
                label: "Node pool instance types",
                icon: "🖥️",
                run: instance_types::run,
                environments: CLOUD,
            },
            CheckId::NodeLabels => CheckDescriptor {
                label: "Node labels and taints",
                icon: "🏷️",
                run: node_labels::run,
                environments: ALL_ENVS,
            },
            CheckId::Firewall => CheckDescriptor {
                label: "Host firewall ports",
                icon: "🧱",
                run: firewall::run,
                environments: ON_PREM,
            },
            CheckId::Connectivity => CheckDescriptor {
                label: "Inter-node connectivity",
                icon: "🔗",
                run: connectivity::run,
                environments: ON_PREM,
            },
            CheckId::Endpoints => CheckDescriptor {
                label: "External endpoint reachability",
                icon: "🌐",
                run: endpoints::run,
                environments: ALL_ENVS,
            },
            CheckId::NetworkPolicy => CheckDescriptor {
                label: "NetworkPolicy audit",
                icon: "🛡️",
                run: network_policy::run,
                environments: ALL_ENVS,
            },
            CheckId::Admission => CheckDescriptor {
                label: "Admission policy dry-run",
                icon: "🚪",
                run: admission::run,
                environments: ALL_ENVS,
            },
            CheckId::Database => CheckDescriptor {
                label: "Database connectivity",
                icon: "🗄️",
                run: database::run,
                environments: ALL_ENVS,
            },
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Hint appended to outbound reachability failures
pub(crate) const EGRESS_HINT: &str = "check egress firewall, proxy settings and DNS";

/// Slack on top of the probe's own wait for the surrounding `kubectl exec`
const EXEC_MARGIN: Duration = Duration::from_secs(30);

/// `nc -z -w <wait> host port` from inside `pod`.
///
/// The inner result is the probe verdict; the outer one only carries a
/// missing `kubectl`.
pub(crate) fn pod_tcp_probe(
    kubectl: Kubectl<'_>,
    namespace: &str,
    pod: &str,
    host: &str,
    port: u16,
    wait: Duration,
) -> Result<Result<(), String>, PreflightError> {
    let secs = wait.as_secs().max(1);
    let command = [
        "nc".to_string(),
        "-z".to_string(),
        "-w".to_string(),
        secs.to_string(),
        host.to_string(),
        port.to_string(),
    ];
    match kubectl.exec(namespace, pod, &command, wait + EXEC_MARGIN) {
        Ok(output) if output.success() => Ok(Ok(())),
        Ok(output) if output.stdout.trim().is_empty() && output.stderr.trim().is_empty() => {
            Ok(Err(format!("no connection within {}s", secs)))
        }
        Ok(output) => Ok(Err(output.error_summary())),
        Err(e @ PreflightError::MissingTool { .. }) => Err(e),
        Err(e) => Ok(Err(e.to_string())),
    }
}
