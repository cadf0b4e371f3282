//! In-cluster reachability of the configured database endpoints.
//!
//! The probe runs from a pod so the result reflects cluster egress and
//! network policy, not the operator's workstation.

use crate::checks::pod_tcp_probe;
use crate::engine::orchestrator::CheckContext;
use crate::engine::provision::Provisioned;
use crate::engine::reporter::Reporter;
use crate::platform::kubectl::Readiness;
use crate::PreflightError;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

const NAMESPACE_PREFIX: &str = "preflight-db";
const PROBE_POD: &str = "db-probe";
const DB_HINT: &str = "check database firewall rules, security groups and private DNS";

fn probe_pod(image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(PROBE_POD.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "probe".to_string(),
                image: Some(image.to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            tolerations: Some(vec![Toleration {
                key: Some("dedicated".to_string()),
                operator: Some("Exists".to_string()),
                ..Default::default()
            }]),
            restart_policy: Some("Never".to_string()),
            termination_grace_period_seconds: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let endpoints = &ctx.run.db_endpoints;
    if endpoints.is_empty() {
        reporter.skip("no database endpoints configured (DB_ENDPOINTS)");
        return Ok(());
    }

    let tunables = &ctx.run.tunables;
    let mut guard = Provisioned::create(ctx.kubectl(), NAMESPACE_PREFIX)?;
    guard.submit(&probe_pod(&tunables.client_image))?;

    let target = [format!("pod/{}", PROBE_POD)];
    if let Readiness::NotReady(reason) = guard.await_ready(&target, tunables.readiness_timeout)? {
        reporter.fail(format!("database probe pod not ready: {}", reason));
        return Ok(());
    }
    guard.begin_probes();

    for endpoint in endpoints {
        let verdict = pod_tcp_probe(
            guard.kubectl(),
            guard.namespace(),
            PROBE_POD,
            &endpoint.host,
            endpoint.port,
            tunables.db_timeout,
        )?;
        match verdict {
            Ok(()) => reporter.pass(format!("database {} reachable from the cluster", endpoint)),
            Err(reason) => reporter.fail(format!(
                "database {} unreachable from the cluster: {}; {}",
                endpoint, reason, DB_HINT
            )),
        }
    }

    guard.release();
    Ok(())
}
