//! Mock cluster fixtures.
//!
//! Builds scripted `FakeRunner`/`FakeNetwork` pairs that simulate:
//! - Healthy AKS, EKS and K3s clusters with the expected node pools
//! - Node pools with disallowed machine types
//! - Restrictive admission and missing database reachability

use k8s_preflight::context::EnvironmentKind;
use k8s_preflight::data::requirements::endpoints_for;
use k8s_preflight::platform::fake::{FakeNetwork, FakeResponse, FakeRunner};
use k8s_preflight::platform::network::url_host;
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};

/// One simulated node
#[derive(Debug, Clone)]
pub struct MockNode {
    pub name: String,
    pub pool: String,
    pub ip: String,
    pub control_plane: bool,
    pub ready: bool,
    pub arch: String,
    /// Raw provider machine type
    pub machine_type: String,
}

impl MockNode {
    pub fn new(name: &str, pool: &str, ip: &str, machine_type: &str) -> Self {
        MockNode {
            name: name.to_string(),
            pool: pool.to_string(),
            ip: ip.to_string(),
            control_plane: false,
            ready: true,
            arch: "amd64".to_string(),
            machine_type: machine_type.to_string(),
        }
    }

    pub fn control_plane(mut self) -> Self {
        self.control_plane = true;
        self
    }
}

/// Mock cluster configuration
#[derive(Debug, Clone)]
pub struct MockClusterConfig {
    pub environment: EnvironmentKind,
    pub kubectl_version: String,
    pub server_version: Option<String>,
    pub nodes: Vec<MockNode>,
    /// PSA enforce level on the target namespace
    pub psa_enforce: Option<String>,
    /// Dry runs rejected by admission
    pub admission_rejects: bool,
    /// Database endpoints that accept connections from the probe pod
    pub reachable_databases: Vec<String>,
    pub endpoints_reachable: bool,
}

impl MockClusterConfig {
    /// A cluster every check is satisfied with
    pub fn healthy(environment: EnvironmentKind) -> Self {
        let nodes = match environment {
            EnvironmentKind::Aks => vec![
                MockNode::new("aks-system-0", "system", "10.224.0.4", "Standard_D4s_v5"),
                MockNode::new("aks-proxy-0", "proxy", "10.224.0.5", "standard_b2s_v2"),
                MockNode::new("aks-workers-0", "workers", "10.224.0.6", "Standard_D8s_v5"),
            ],
            EnvironmentKind::Eks => vec![
                MockNode::new("ip-10-0-1-10", "system", "10.0.1.10", "m6i.xlarge"),
                MockNode::new("ip-10-0-1-11", "proxy", "10.0.1.11", "t3.medium"),
                MockNode::new("ip-10-0-1-12", "workers", "10.0.1.12", "m6i.2xlarge"),
            ],
            EnvironmentKind::K3s => vec![
                MockNode::new("k3s-server-1", "system", "192.168.10.11", "").control_plane(),
                MockNode::new("k3s-proxy-1", "proxy", "192.168.10.21", ""),
                MockNode::new("k3s-agent-1", "workers", "192.168.10.31", ""),
            ],
        };

        MockClusterConfig {
            environment,
            kubectl_version: "v1.30.4".to_string(),
            server_version: Some("v1.30.2".to_string()),
            nodes,
            psa_enforce: None,
            admission_rejects: false,
            reachable_databases: Vec::new(),
            endpoints_reachable: true,
        }
    }

    pub fn with_machine_type(mut self, pool: &str, machine_type: &str) -> Self {
        for node in self.nodes.iter_mut().filter(|n| n.pool == pool) {
            node.machine_type = machine_type.to_string();
        }
        self
    }

    pub fn with_restricted_admission(mut self) -> Self {
        self.psa_enforce = Some("restricted".to_string());
        self.admission_rejects = true;
        self
    }

    pub fn with_reachable_database(mut self, host: &str) -> Self {
        self.reachable_databases.push(host.to_string());
        self
    }

    fn pool_label_key(&self) -> &'static str {
        k8s_preflight::data::requirements::pool_label_key(self.environment)
    }

    pub fn nodes_json(&self) -> String {
        let items: Vec<Value> = self
            .nodes
            .iter()
            .map(|n| {
                let mut labels = json!({
                    "kubernetes.io/os": "linux",
                    "kubernetes.io/arch": n.arch,
                });
                labels[self.pool_label_key()] = json!(n.pool);
                if n.control_plane {
                    labels["node-role.kubernetes.io/control-plane"] = json!("true");
                }
                let taints = if n.pool == "proxy" {
                    json!([{"key": "dedicated", "value": "proxy", "effect": "NoSchedule"}])
                } else {
                    json!([])
                };
                json!({
                    "apiVersion": "v1",
                    "kind": "Node",
                    "metadata": {"name": n.name, "labels": labels},
                    "spec": {"taints": taints},
                    "status": {
                        "conditions": [{"type": "Ready", "status": if n.ready { "True" } else { "False" }}],
                        "addresses": [{"type": "InternalIP", "address": n.ip}]
                    }
                })
            })
            .collect();
        json!({"apiVersion": "v1", "kind": "List", "items": items}).to_string()
    }

    fn aks_pools_json(&self) -> String {
        let pools: Vec<Value> = self
            .nodes
            .iter()
            .map(|n| json!({"name": n.pool, "vmSize": n.machine_type, "count": 1}))
            .collect();
        Value::Array(pools).to_string()
    }

    fn probe_pods_json(&self) -> String {
        let mut items = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            for component in ["preflight-server", "preflight-client"] {
                items.push(json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": format!("{}-{}", component, i),
                        "labels": {
                            "app.kubernetes.io/name": "preflight-probe",
                            "app.kubernetes.io/component": component
                        }
                    },
                    "spec": {"nodeName": node.name, "containers": [{"name": "probe"}]},
                    "status": {"podIP": format!("10.42.{}.{}", i, if component == "preflight-server" { 10 } else { 11 })}
                }));
            }
        }
        json!({"items": items}).to_string()
    }

    /// Scripted command runner for this cluster
    pub fn runner(&self) -> FakeRunner {
        let client = json!({"clientVersion": {"gitVersion": self.kubectl_version}});
        let mut full = client.clone();
        if let Some(server) = &self.server_version {
            full["serverVersion"] = json!({"gitVersion": server});
        }

        let mut namespace = json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "default"}});
        if let Some(level) = &self.psa_enforce {
            namespace["metadata"]["labels"] = json!({"pod-security.kubernetes.io/enforce": level});
        }

        let dry_run = if self.admission_rejects {
            FakeResponse::fail(1, "Error from server (Forbidden): violates PodSecurity \"restricted:latest\"")
        } else {
            FakeResponse::ok("pod created (server dry run)")
        };

        let mut runner = FakeRunner::new()
            // tools
            .on("kubectl version --client", FakeResponse::ok(client.to_string()))
            .on("kubectl version -o json", FakeResponse::ok(full.to_string()))
            .on("helm version", FakeResponse::ok("v3.14.2"))
            .on("az version", FakeResponse::ok(r#"{"azure-cli": "2.61.0"}"#))
            .on("aws --version", FakeResponse::ok("aws-cli/2.15.0 Python/3.11.6 Linux/6.1"))
            // inventory
            .on("kubectl get nodes", FakeResponse::ok(self.nodes_json()))
            .on("az aks nodepool list", FakeResponse::ok(self.aks_pools_json()))
            // host firewall
            .on("firewall-cmd --state", FakeResponse::ok("running"))
            .on(
                "firewall-cmd --list-ports",
                FakeResponse::ok("6443/tcp 10250/tcp 8472/udp 2379-2380/tcp 51820-51821/udp 5001/tcp"),
            )
            // policy and admission
            .on("kubectl api-resources", FakeResponse::ok("networkpolicies.networking.k8s.io\n"))
            .on("kubectl get networkpolicies", FakeResponse::ok(r#"{"items": []}"#))
            .on("kubectl get namespace", FakeResponse::ok(namespace.to_string()))
            .on("kubectl apply --dry-run=server", dry_run)
            // temporary namespaces
            .on("kubectl create -f -", FakeResponse::ok("namespace created"))
            .on("kubectl apply -n", FakeResponse::ok("configured"))
            .on("kubectl rollout status", FakeResponse::ok("successfully rolled out"))
            .on("kubectl wait", FakeResponse::ok("condition met"))
            .on("kubectl get pods", FakeResponse::ok(self.probe_pods_json()))
            .on("kubectl exec", FakeResponse::ok(""))
            .on("kubectl delete namespace", FakeResponse::ok("deleted"));

        let groups: Vec<&str> = self.nodes.iter().map(|n| n.pool.as_str()).collect();
        runner = runner.on(
            "aws eks list-nodegroups",
            FakeResponse::ok(json!({"nodegroups": groups}).to_string()),
        );
        for node in &self.nodes {
            runner = runner.on(
                format!("aws eks describe-nodegroup --cluster-name eks-prod --nodegroup-name {}", node.pool),
                FakeResponse::ok(
                    json!({"nodegroup": {"nodegroupName": node.pool, "instanceTypes": [node.machine_type]}})
                        .to_string(),
                ),
            );
        }

        if !self.reachable_databases.is_empty() {
            // Every database probe fails unless listed as reachable
            runner = runner.on_contains(" -- nc -z -w 7 ", FakeResponse::fail(1, ""));
            for host in &self.reachable_databases {
                runner = runner.on_contains(format!(" -- nc -z -w 7 {} ", host), FakeResponse::ok(""));
            }
        }
        runner
    }

    /// Network probe for this cluster
    pub fn network(&self) -> FakeNetwork {
        let mut network = FakeNetwork::new();
        if self.endpoints_reachable {
            for url in endpoints_for(self.environment) {
                if let Some(host) = url_host(url) {
                    network = network
                        .with_host(host, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
                        .with_url(url, 200);
                }
            }
        }
        for node in &self.nodes {
            network = network.with_open_port(&node.ip, 10250);
            if node.control_plane {
                network = network.with_open_port(&node.ip, 6443);
            }
        }
        network
    }
}
