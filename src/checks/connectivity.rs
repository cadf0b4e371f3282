//! Pod-to-pod connectivity across nodes (k3s).
//!
//! A server DaemonSet (agnhost netexec) and a client DaemonSet (busybox)
//! are scheduled on every node of a temporary namespace. Each client then
//! dials each server pod directly, the server Service by DNS name, and
//! resolves the cluster's own API service. All probes are bounded.

use crate::checks::pod_tcp_probe;
use crate::data::requirements::PROBE_SERVER_PORT;
use crate::engine::orchestrator::CheckContext;
use crate::engine::provision::Provisioned;
use crate::engine::reporter::Reporter;
use crate::platform::kubectl::{label, Readiness};
use crate::PreflightError;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec, Toleration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

const NAMESPACE_PREFIX: &str = "preflight-conn";
const SERVER_NAME: &str = "preflight-server";
const CLIENT_NAME: &str = "preflight-client";
const NAME_LABEL: (&str, &str) = ("app.kubernetes.io/name", "preflight-probe");
const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
const CLUSTER_DNS_NAME: &str = "kubernetes.default.svc.cluster.local";

fn labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAME_LABEL.0.to_string(), NAME_LABEL.1.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}

/// DaemonSet tolerating every taint so each node gets a pod
fn daemonset(name: &str, container: Container) -> DaemonSet {
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(name)),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels(name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_string()),
                        ..Default::default()
                    }]),
                    termination_grace_period_seconds: Some(1),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn server_daemonset(image: &str) -> DaemonSet {
    daemonset(
        SERVER_NAME,
        Container {
            name: "server".to_string(),
            image: Some(image.to_string()),
            args: Some(vec![
                "netexec".to_string(),
                format!("--http-port={}", PROBE_SERVER_PORT),
            ]),
            ports: Some(vec![ContainerPort {
                container_port: i32::from(PROBE_SERVER_PORT),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        },
    )
}

fn client_daemonset(image: &str) -> DaemonSet {
    daemonset(
        CLIENT_NAME,
        Container {
            name: "client".to_string(),
            image: Some(image.to_string()),
            command: Some(vec!["sleep".to_string(), "3600".to_string()]),
            ..Default::default()
        },
    )
}

fn server_service() -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            labels: Some(labels(SERVER_NAME)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels(SERVER_NAME)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: i32::from(PROBE_SERVER_PORT),
                target_port: Some(IntOrString::Int(i32::from(PROBE_SERVER_PORT))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A running probe pod
#[derive(Debug, Clone)]
struct ProbePod {
    name: String,
    node: String,
    ip: Option<String>,
}

fn probe_pods(pods: &[Pod], component: &str) -> Vec<ProbePod> {
    pods.iter()
        .filter(|p| label(&p.metadata, COMPONENT_LABEL) == Some(component))
        .filter_map(|p| {
            Some(ProbePod {
                name: p.metadata.name.clone()?,
                node: p
                    .spec
                    .as_ref()
                    .and_then(|s| s.node_name.clone())
                    .unwrap_or_else(|| "<unscheduled>".to_string()),
                ip: p.status.as_ref().and_then(|s| s.pod_ip.clone()),
            })
        })
        .collect()
}

fn probe_mesh(
    guard: &Provisioned<'_>,
    clients: &[ProbePod],
    servers: &[ProbePod],
    wait: Duration,
    reporter: &mut Reporter,
) -> Result<(), PreflightError> {
    let kubectl = guard.kubectl();
    let namespace = guard.namespace();

    let mut targets = Vec::with_capacity(servers.len());
    for server in servers {
        match server.ip.as_deref() {
            Some(ip) => targets.push((server, ip)),
            None => reporter.fail(format!("server pod on {} has no IP", server.node)),
        }
    }

    for client in clients {
        for &(server, ip) in &targets {
            let path = format!("{} -> {} ({}:{})", client.node, server.node, ip, PROBE_SERVER_PORT);
            match pod_tcp_probe(kubectl, namespace, &client.name, ip, PROBE_SERVER_PORT, wait)? {
                Ok(()) => reporter.pass(format!("pod path {} reachable", path)),
                Err(reason) => reporter.fail(format!("pod path {} unreachable: {}", path, reason)),
            }
        }

        let service_host = format!("{}.{}.svc.cluster.local", SERVER_NAME, namespace);
        match pod_tcp_probe(kubectl, namespace, &client.name, &service_host, PROBE_SERVER_PORT, wait)? {
            Ok(()) => reporter.pass(format!("service DNS {} reachable from {}", SERVER_NAME, client.node)),
            Err(reason) => reporter.fail(format!(
                "service DNS {} unreachable from {}: {}",
                SERVER_NAME, client.node, reason
            )),
        }

        let lookup = ["nslookup".to_string(), CLUSTER_DNS_NAME.to_string()];
        let dns = kubectl.exec(namespace, &client.name, &lookup, wait + Duration::from_secs(30));
        match dns {
            Ok(output) if output.success() => {
                reporter.pass(format!("cluster DNS resolves {} from {}", CLUSTER_DNS_NAME, client.node))
            }
            Ok(output) => reporter.fail(format!(
                "cluster DNS lookup failed from {}: {}",
                client.node,
                output.error_summary()
            )),
            Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
            Err(e) => reporter.fail(format!("cluster DNS lookup failed from {}: {}", client.node, e)),
        }
    }
    Ok(())
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let tunables = &ctx.run.tunables;
    let mut guard = match Provisioned::create(ctx.kubectl(), NAMESPACE_PREFIX) {
        Ok(guard) => guard,
        Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
        Err(e) => {
            reporter.fail(format!("cannot create probe namespace: {}", e));
            return Ok(());
        }
    };
    reporter.note(format!("probe namespace {}", guard.namespace()));

    guard.submit(&server_daemonset(&tunables.server_image))?;
    guard.submit(&client_daemonset(&tunables.client_image))?;
    guard.submit(&server_service())?;

    let targets = [
        format!("daemonset/{}", SERVER_NAME),
        format!("daemonset/{}", CLIENT_NAME),
    ];
    if let Readiness::NotReady(reason) = guard.await_ready(&targets, tunables.readiness_timeout)? {
        reporter.fail(format!("probe pods not ready: {}", reason));
        return Ok(());
    }
    guard.begin_probes();

    let pods = guard
        .kubectl()
        .list_pods(guard.namespace(), &format!("{}={}", NAME_LABEL.0, NAME_LABEL.1))?;
    let servers = probe_pods(&pods, SERVER_NAME);
    let clients = probe_pods(&pods, CLIENT_NAME);
    debug!(servers = servers.len(), clients = clients.len(), "probe pods");

    if servers.is_empty() || clients.is_empty() {
        reporter.fail("probe daemonsets report ready but no probe pods were found");
        return Ok(());
    }

    let nodes: BTreeSet<&str> = servers.iter().map(|s| s.node.as_str()).collect();
    if nodes.len() < 2 {
        reporter.warn(format!(
            "only one node ({}) runs probe pods; inter-node paths not exercised",
            nodes.iter().next().copied().unwrap_or("<none>")
        ));
    }

    probe_mesh(&guard, &clients, &servers, tunables.http_timeout, reporter)?;
    guard.release();
    Ok(())
}
