//! Run context shared read-only by every check.
//!
//! Built once before any check runs (flags, environment variables and
//! interactive prompts are resolved at the edge) and never mutated
//! afterwards. External checks receive it exported as environment
//! variables via [`RunContext::to_env_vars`].

use crate::PreflightError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_TARGET_NAMESPACE: &str = "default";
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(7);
pub const DEFAULT_SERVER_IMAGE: &str = "registry.k8s.io/e2e-test-images/agnhost:2.47";
pub const DEFAULT_CLIENT_IMAGE: &str = "busybox:1.36";

/// Target deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// Azure Kubernetes Service
    Aks,
    /// Amazon Elastic Kubernetes Service
    Eks,
    /// On-prem K3s
    K3s,
}

impl EnvironmentKind {
    pub const ALL: [EnvironmentKind; 3] = [EnvironmentKind::Aks, EnvironmentKind::Eks, EnvironmentKind::K3s];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentKind::Aks => "aks",
            EnvironmentKind::Eks => "eks",
            EnvironmentKind::K3s => "k3s",
        }
    }

    pub fn is_cloud(self) -> bool {
        !matches!(self, EnvironmentKind::K3s)
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentKind {
    type Err = PreflightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aks" => Ok(EnvironmentKind::Aks),
            "eks" => Ok(EnvironmentKind::Eks),
            "k3s" => Ok(EnvironmentKind::K3s),
            other => Err(PreflightError::Config(format!(
                "unknown environment '{}' (expected aks, eks or k3s)",
                other
            ))),
        }
    }
}

/// A database endpoint probed from inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbEndpoint {
    pub host: String,
    pub port: u16,
}

impl DbEndpoint {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(s: &str) -> Result<Self, PreflightError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PreflightError::Config("empty database endpoint".to_string()));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                PreflightError::Config(format!("unterminated IPv6 address in endpoint '{}'", s))
            })?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(PreflightError::Config(format!("malformed endpoint '{}'", s)))
                    }
                },
            }
        } else {
            match s.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => {
                    return Err(PreflightError::Config(format!(
                        "IPv6 address in endpoint '{}' must be bracketed, e.g. [{}]:{}",
                        s, s, DEFAULT_DB_PORT
                    )))
                }
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(PreflightError::Config(format!("missing host in endpoint '{}'", s)));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
                PreflightError::Config(format!("invalid port '{}' in endpoint '{}'", p, s))
            })?,
            None => DEFAULT_DB_PORT,
        };

        Ok(DbEndpoint {
            host: host.to_string(),
            port,
        })
    }

    /// Parse a comma and/or whitespace separated list
    pub fn parse_list(s: &str) -> Result<Vec<Self>, PreflightError> {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(DbEndpoint::parse)
            .collect()
    }
}

impl fmt::Display for DbEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse a duration given as `180`, `180s` or `3m`.
pub fn parse_duration(s: &str) -> Result<Duration, PreflightError> {
    let s = s.trim();
    let (digits, multiplier) = if let Some(d) = s.strip_suffix('m') {
        (d, 60)
    } else if let Some(d) = s.strip_suffix('s') {
        (d, 1)
    } else {
        (s, 1)
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .map(|v| Duration::from_secs(v * multiplier))
        .ok_or_else(|| PreflightError::Config(format!("invalid duration '{}'", s)))
}

/// Per-operation tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunables {
    /// Bound on pod / daemonset readiness waits
    pub readiness_timeout: Duration,
    /// Bound on each external endpoint request and TCP probe
    pub http_timeout: Duration,
    /// Bound on each database reachability probe
    pub db_timeout: Duration,
    /// Image serving the inter-node connectivity probe
    pub server_image: String,
    /// Image used for probe clients and admission dry-runs
    pub client_image: String,
    /// Extra URLs appended to the external endpoint list
    pub extra_endpoints: Vec<String>,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            db_timeout: DEFAULT_DB_TIMEOUT,
            server_image: DEFAULT_SERVER_IMAGE.to_string(),
            client_image: DEFAULT_CLIENT_IMAGE.to_string(),
            extra_endpoints: Vec::new(),
        }
    }
}

/// Immutable configuration shared by every check in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    pub environment: EnvironmentKind,
    pub resource_group: Option<String>,
    pub cluster_name: Option<String>,
    pub db_endpoints: Vec<DbEndpoint>,
    pub target_namespace: String,
    pub tunables: Tunables,
}

impl RunContext {
    /// Context with defaults for everything but the environment
    pub fn new(environment: EnvironmentKind) -> Self {
        RunContext {
            environment,
            resource_group: None,
            cluster_name: None,
            db_endpoints: Vec::new(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            tunables: Tunables::default(),
        }
    }

    pub fn with_cluster(mut self, resource_group: Option<&str>, cluster_name: Option<&str>) -> Self {
        self.resource_group = resource_group.map(str::to_string);
        self.cluster_name = cluster_name.map(str::to_string);
        self
    }

    pub fn with_db_endpoints(mut self, endpoints: Vec<DbEndpoint>) -> Self {
        self.db_endpoints = endpoints;
        self
    }

    pub fn with_target_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.target_namespace = namespace.into();
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Cluster name, required by the cloud CLI paths
    pub fn require_cluster_name(&self) -> Result<&str, PreflightError> {
        self.cluster_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PreflightError::Config("CLUSTER_NAME is required for this environment".to_string()))
    }

    /// Resource group, required by the `az` paths
    pub fn require_resource_group(&self) -> Result<&str, PreflightError> {
        self.resource_group
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PreflightError::Config("RESOURCE_GROUP is required for aks".to_string()))
    }

    /// Export as the environment variable contract for external checks
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("ENVIRONMENT".to_string(), self.environment.to_string()),
            ("TARGET_NAMESPACE".to_string(), self.target_namespace.clone()),
            (
                "PREFLIGHT_READINESS_TIMEOUT".to_string(),
                format!("{}s", self.tunables.readiness_timeout.as_secs()),
            ),
            (
                "PREFLIGHT_HTTP_TIMEOUT".to_string(),
                self.tunables.http_timeout.as_secs().to_string(),
            ),
            (
                "PREFLIGHT_DB_TIMEOUT_SECS".to_string(),
                self.tunables.db_timeout.as_secs().to_string(),
            ),
            ("PREFLIGHT_SERVER_IMAGE".to_string(), self.tunables.server_image.clone()),
            ("PREFLIGHT_CLIENT_IMAGE".to_string(), self.tunables.client_image.clone()),
        ];

        if let Some(rg) = &self.resource_group {
            vars.push(("RESOURCE_GROUP".to_string(), rg.clone()));
        }
        if let Some(name) = &self.cluster_name {
            vars.push(("CLUSTER_NAME".to_string(), name.clone()));
        }
        if !self.db_endpoints.is_empty() {
            let joined = self
                .db_endpoints
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(",");
            vars.push(("DB_ENDPOINTS".to_string(), joined));
        }
        if !self.tunables.extra_endpoints.is_empty() {
            vars.push((
                "PREFLIGHT_EXTRA_ENDPOINTS".to_string(),
                self.tunables.extra_endpoints.join(","),
            ));
        }

        vars
    }
}
