//! Static platform requirements: ports, external endpoints, node labels
//! and taints.

use crate::context::EnvironmentKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// A host firewall opening the on-prem cluster needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRule {
    pub first: u16,
    pub last: u16,
    pub protocol: Protocol,
    pub purpose: &'static str,
    /// Missing required ports FAIL, missing optional ports WARN
    pub required: bool,
}

impl PortRule {
    const fn single(port: u16, protocol: Protocol, purpose: &'static str, required: bool) -> Self {
        PortRule {
            first: port,
            last: port,
            protocol,
            purpose,
            required,
        }
    }

    /// Whether an open range `[first, last]` covers this rule. A range
    /// without a protocol is open for both.
    pub fn covered_by(&self, first: u16, last: u16, protocol: Option<Protocol>) -> bool {
        protocol.map_or(true, |p| p == self.protocol) && first <= self.first && self.last <= last
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}/{}", self.first, self.protocol.as_str())
        } else {
            write!(f, "{}-{}/{}", self.first, self.last, self.protocol.as_str())
        }
    }
}

pub const K3S_PORTS: &[PortRule] = &[
    PortRule::single(6443, Protocol::Tcp, "Kubernetes API server", true),
    PortRule::single(10250, Protocol::Tcp, "kubelet metrics", true),
    PortRule::single(8472, Protocol::Udp, "flannel VXLAN", true),
    PortRule {
        first: 2379,
        last: 2380,
        protocol: Protocol::Tcp,
        purpose: "embedded etcd (HA servers)",
        required: false,
    },
    PortRule::single(51820, Protocol::Udp, "flannel WireGuard IPv4", false),
    PortRule::single(51821, Protocol::Udp, "flannel WireGuard IPv6", false),
    PortRule::single(5001, Protocol::Tcp, "embedded registry (spegel)", false),
];

pub const API_SERVER_PORT: u16 = 6443;
pub const KUBELET_PORT: u16 = 10250;

/// Port the connectivity probe server listens on
pub const PROBE_SERVER_PORT: u16 = 8080;

const COMMON_ENDPOINTS: &[&str] = &["https://registry.k8s.io/", "https://get.helm.sh/"];

const AKS_ENDPOINTS: &[&str] = &[
    "https://mcr.microsoft.com/",
    "https://management.azure.com/",
    "https://login.microsoftonline.com/",
    "https://packages.aks.azure.com/",
];

const EKS_ENDPOINTS: &[&str] = &[
    "https://public.ecr.aws/",
    "https://sts.amazonaws.com/",
    "https://eks.amazonaws.com/",
];

const K3S_ENDPOINTS: &[&str] = &[
    "https://get.k3s.io/",
    "https://registry-1.docker.io/v2/",
    "https://github.com/",
];

/// External endpoints the cluster must reach, common ones first
pub fn endpoints_for(environment: EnvironmentKind) -> Vec<&'static str> {
    let specific = match environment {
        EnvironmentKind::Aks => AKS_ENDPOINTS,
        EnvironmentKind::Eks => EKS_ENDPOINTS,
        EnvironmentKind::K3s => K3S_ENDPOINTS,
    };
    COMMON_ENDPOINTS.iter().chain(specific).copied().collect()
}

pub const OS_LABEL: &str = "kubernetes.io/os";
pub const ARCH_LABEL: &str = "kubernetes.io/arch";
pub const EXPECTED_ARCH: &str = "amd64";

pub const CONTROL_PLANE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Node label carrying the pool name
pub fn pool_label_key(environment: EnvironmentKind) -> &'static str {
    match environment {
        EnvironmentKind::Aks => "kubernetes.azure.com/agentpool",
        EnvironmentKind::Eks => "eks.amazonaws.com/nodegroup",
        EnvironmentKind::K3s => "node.kubernetes.io/pool",
    }
}

/// Taint every proxy node must carry
pub const PROXY_TAINT: ExpectedTaint = ExpectedTaint {
    key: "dedicated",
    value: "proxy",
    effect: "NoSchedule",
};

/// Effects that keep general workloads off a worker node
pub const BLOCKING_EFFECTS: &[&str] = &["NoSchedule", "NoExecute"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedTaint {
    pub key: &'static str,
    pub value: &'static str,
    pub effect: &'static str,
}

impl fmt::Display for ExpectedTaint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.key, self.value, self.effect)
    }
}

/// Pod Security Admission enforce label on namespaces
pub const PSA_ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";
