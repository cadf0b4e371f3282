//! Node pool machine types against the per-pool allow-lists (aks, eks).

use crate::context::EnvironmentKind;
use crate::data::allowlists::{allowed_types, normalize_instance_type, pool_matches, POOLS};
use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::platform::cloud::{aks_node_pools, eks_node_groups, NodePool};
use crate::PreflightError;
use tracing::debug;

fn inventory(ctx: &CheckContext<'_>) -> Result<Vec<NodePool>, PreflightError> {
    let cluster = ctx.run.require_cluster_name()?;
    match ctx.environment() {
        EnvironmentKind::Aks => {
            let resource_group = ctx.run.require_resource_group()?;
            aks_node_pools(ctx.runner, resource_group, cluster)
        }
        EnvironmentKind::Eks => eks_node_groups(ctx.runner, cluster),
        EnvironmentKind::K3s => Ok(Vec::new()),
    }
}

fn check_pool(env: EnvironmentKind, pool: &NodePool, platform_pool: &str, reporter: &mut Reporter) {
    let Some(allowed) = allowed_types(env, platform_pool) else {
        reporter.skip(format!("no allow-list for pool {}", platform_pool));
        return;
    };

    if pool.instance_types.is_empty() {
        reporter.warn(format!("node pool {} reports no instance type", pool.name));
        return;
    }

    for raw in &pool.instance_types {
        let canonical = normalize_instance_type(env, raw);
        debug!(pool = %pool.name, raw = %raw, canonical = %canonical, "instance type");
        if allowed.contains(&canonical.as_str()) {
            reporter.pass(format!("node pool {} uses allowed type {}", pool.name, canonical));
        } else {
            reporter.fail(format!(
                "node pool {} uses {}; allowed for {}: {}",
                pool.name,
                canonical,
                platform_pool,
                allowed.join(", ")
            ));
        }
    }
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let env = ctx.environment();
    let pools = match inventory(ctx) {
        Ok(pools) => pools,
        Err(PreflightError::Config(message)) => {
            reporter.fail(message);
            return Ok(());
        }
        Err(PreflightError::MissingTool { tool }) => {
            reporter.fail(format!("{} is not installed; cannot list node pools", tool));
            return Ok(());
        }
        Err(e) => {
            reporter.fail(format!("cannot list node pools: {}", e));
            return Ok(());
        }
    };

    for platform_pool in POOLS {
        let matching: Vec<&NodePool> = pools
            .iter()
            .filter(|p| pool_matches(&p.name, platform_pool))
            .collect();
        if matching.is_empty() {
            reporter.skip(format!("no {} node pool found", platform_pool));
            continue;
        }
        for pool in matching {
            check_pool(env, pool, platform_pool, reporter);
        }
    }

    let unmatched: Vec<&str> = pools
        .iter()
        .filter(|p| !POOLS.iter().any(|name| pool_matches(&p.name, name)))
        .map(|p| p.name.as_str())
        .collect();
    if !unmatched.is_empty() {
        reporter.note(format!("pools outside the platform layout: {}", unmatched.join(", ")));
    }
    Ok(())
}
