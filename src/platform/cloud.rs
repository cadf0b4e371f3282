//! Cloud provider CLIs (`az`, `aws`) for node pool inventory.

use crate::platform::command::{CommandRunner, CommandSpec};
use crate::PreflightError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Bound on a single cloud CLI call
pub const CLOUD_CALL_TIMEOUT: Duration = Duration::from_secs(90);

/// Node pool, as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePool {
    pub name: String,
    /// Raw provider machine types (one for AKS, possibly several for EKS)
    pub instance_types: Vec<String>,
}

/// Entry of `az aks nodepool list -o json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AksNodePool {
    name: String,
    #[serde(default)]
    vm_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EksNodeGroupList {
    #[serde(default)]
    nodegroups: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EksNodeGroupEnvelope {
    nodegroup: EksNodeGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EksNodeGroup {
    nodegroup_name: String,
    #[serde(default)]
    instance_types: Option<Vec<String>>,
}

fn run_json<T: for<'de> Deserialize<'de>>(
    runner: &dyn CommandRunner,
    spec: CommandSpec,
    context: &str,
) -> Result<T, PreflightError> {
    let output = runner.run_ok(&spec.timeout(CLOUD_CALL_TIMEOUT))?;
    serde_json::from_str(&output.stdout).map_err(|e| PreflightError::parse(context, e))
}

/// AKS node pools of a cluster
pub fn aks_node_pools(
    runner: &dyn CommandRunner,
    resource_group: &str,
    cluster_name: &str,
) -> Result<Vec<NodePool>, PreflightError> {
    let pools: Vec<AksNodePool> = run_json(
        runner,
        CommandSpec::new("az").args([
            "aks",
            "nodepool",
            "list",
            "--resource-group",
            resource_group,
            "--cluster-name",
            cluster_name,
            "-o",
            "json",
        ]),
        "az aks nodepool list",
    )?;

    debug!(count = pools.len(), "aks node pools");
    Ok(pools
        .into_iter()
        .map(|p| NodePool {
            name: p.name,
            instance_types: p.vm_size.into_iter().collect(),
        })
        .collect())
}

/// EKS managed node groups of a cluster
pub fn eks_node_groups(runner: &dyn CommandRunner, cluster_name: &str) -> Result<Vec<NodePool>, PreflightError> {
    let list: EksNodeGroupList = run_json(
        runner,
        CommandSpec::new("aws").args([
            "eks",
            "list-nodegroups",
            "--cluster-name",
            cluster_name,
            "--output",
            "json",
        ]),
        "aws eks list-nodegroups",
    )?;

    let mut groups = Vec::with_capacity(list.nodegroups.len());
    for name in &list.nodegroups {
        let envelope: EksNodeGroupEnvelope = run_json(
            runner,
            CommandSpec::new("aws").args([
                "eks",
                "describe-nodegroup",
                "--cluster-name",
                cluster_name,
                "--nodegroup-name",
                name,
                "--output",
                "json",
            ]),
            "aws eks describe-nodegroup",
        )?;
        groups.push(NodePool {
            name: envelope.nodegroup.nodegroup_name,
            instance_types: envelope.nodegroup.instance_types.unwrap_or_default(),
        });
    }

    debug!(count = groups.len(), "eks node groups");
    Ok(groups)
}
