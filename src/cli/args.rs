//! Command line arguments.
//!
//! Every setting can come from a flag or its environment variable (flag
//! wins). Durations and endpoint lists are validated here, at the edge.

use crate::context::{
    parse_duration, DbEndpoint, EnvironmentKind, Tunables, DEFAULT_CLIENT_IMAGE, DEFAULT_SERVER_IMAGE,
    DEFAULT_TARGET_NAMESPACE,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Summary format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

/// Parsed `DB_ENDPOINTS` value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbEndpointList(pub Vec<DbEndpoint>);

fn parse_db_endpoints(s: &str) -> Result<DbEndpointList, String> {
    DbEndpoint::parse_list(s)
        .map(DbEndpointList)
        .map_err(|e| e.to_string())
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "k8s-preflight",
    about = "Preflight validation for Kubernetes platform deployments on AKS, EKS and on-prem K3s",
    long_about = "Runs readiness checks against the target cluster and cloud account and prints a \
                  PASS/WARN/FAIL/SKIP summary.\n\nConfiguration precedence: flag > environment \
                  variable > interactive prompt > default.\n\nExit codes: 0 no failures, 1 at least \
                  one FAIL, 2 usage or configuration error, 130 interrupted.",
    after_help = "Examples:\n  k8s-preflight -e k3s --db-endpoints db1.internal,db2.internal:6432\n  \
                  k8s-preflight -e aks --resource-group rg-platform --cluster-name aks-prod -v\n  \
                  k8s-preflight -e eks --cluster-name eks-prod --only tools --only endpoints --format json",
    disable_version_flag = true
)]
pub struct Args {
    /// Target environment
    #[arg(short = 'e', long, env = "ENVIRONMENT", value_enum)]
    pub environment: Option<EnvironmentKind>,

    /// Azure resource group of the cluster (aks)
    #[arg(long, env = "RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Cluster name (aks, eks)
    #[arg(long, env = "CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// Database endpoints, comma or space separated host[:port] (default port 5432)
    #[arg(long, env = "DB_ENDPOINTS", value_parser = parse_db_endpoints)]
    pub db_endpoints: Option<DbEndpointList>,

    /// Namespace used for admission dry-run probes
    #[arg(long, env = "TARGET_NAMESPACE", default_value = DEFAULT_TARGET_NAMESPACE)]
    pub target_namespace: String,

    /// Bound on pod and daemonset readiness waits (e.g. 180, 180s, 3m)
    #[arg(long, env = "PREFLIGHT_READINESS_TIMEOUT", default_value = "180s", value_parser = parse_duration_arg)]
    pub readiness_timeout: Duration,

    /// Bound on each external endpoint request and host TCP probe
    #[arg(long, env = "PREFLIGHT_HTTP_TIMEOUT", default_value = "10s", value_parser = parse_duration_arg)]
    pub http_timeout: Duration,

    /// Bound on each database reachability probe
    #[arg(long, env = "PREFLIGHT_DB_TIMEOUT_SECS", default_value = "7", value_parser = parse_duration_arg)]
    pub db_timeout: Duration,

    /// Image serving the inter-node connectivity probe
    #[arg(long, env = "PREFLIGHT_SERVER_IMAGE", default_value = DEFAULT_SERVER_IMAGE)]
    pub server_image: String,

    /// Image for probe clients and admission dry-runs
    #[arg(long, env = "PREFLIGHT_CLIENT_IMAGE", default_value = DEFAULT_CLIENT_IMAGE)]
    pub client_image: String,

    /// Additional URLs the cluster must reach (comma separated)
    #[arg(long, env = "PREFLIGHT_EXTRA_ENDPOINTS", value_delimiter = ',')]
    pub extra_endpoints: Vec<String>,

    /// Stream check output live
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug logging: timestamps, resolved paths, context snapshot
    #[arg(short, long)]
    pub debug: bool,

    /// Never prompt; missing settings are errors
    #[arg(short = 'y', long)]
    pub non_interactive: bool,

    /// Run only these checks (repeatable or comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "skip")]
    pub only: Vec<String>,

    /// Skip these checks (repeatable or comma separated)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Additional check executable run after the built-in checks (repeatable)
    #[arg(long, value_name = "PATH")]
    pub extra_check: Vec<PathBuf>,

    /// Summary format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable colored output (also honors NO_COLOR)
    #[arg(long)]
    pub no_color: bool,

    /// List checks and exit
    #[arg(long)]
    pub list: bool,

    /// Print version and build information
    #[arg(short = 'V', long)]
    pub version: bool,
}

impl Args {
    /// Whether colored output is wanted
    pub fn color_enabled(&self) -> bool {
        !self.no_color
            && self.format == OutputFormat::Text
            && std::env::var_os("NO_COLOR").map_or(true, |v| v.is_empty())
    }

    pub fn tunables(&self) -> Tunables {
        Tunables {
            readiness_timeout: self.readiness_timeout,
            http_timeout: self.http_timeout,
            db_timeout: self.db_timeout,
            server_image: self.server_image.clone(),
            client_image: self.client_image.clone(),
            extra_endpoints: self
                .extra_endpoints
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["k8s-preflight"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["-e", "k3s"]);
        assert_eq!(args.environment, Some(EnvironmentKind::K3s));
        assert_eq!(args.readiness_timeout, Duration::from_secs(180));
        assert_eq!(args.db_timeout, Duration::from_secs(7));
        assert_eq!(args.target_namespace, "default");
        assert_eq!(args.format, OutputFormat::Text);
        assert!(args.db_endpoints.is_none());
    }

    #[test]
    fn test_db_endpoint_flag() {
        let args = parse(&["-e", "aks", "--db-endpoints", "db1, db2:6432"]);
        let list = args.db_endpoints.unwrap().0;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].port, 5432);
        assert_eq!(list[1].port, 6432);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let argv = ["k8s-preflight", "-e", "gke"];
        assert!(Args::try_parse_from(argv).is_err());
        let argv = ["k8s-preflight", "--readiness-timeout", "soon"];
        assert!(Args::try_parse_from(argv).is_err());
        let argv = ["k8s-preflight", "--db-endpoints", "db:99999"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_selection_lists() {
        let args = parse(&["--only", "tools,endpoints", "--only", "database"]);
        assert_eq!(args.only, vec!["tools", "endpoints", "database"]);
        let argv = ["k8s-preflight", "--only", "tools", "--skip", "database"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_tunables_from_flags() {
        let args = parse(&["--http-timeout", "15", "--extra-endpoints", "https://a.example/, ,https://b.example/"]);
        let t = args.tunables();
        assert_eq!(t.http_timeout, Duration::from_secs(15));
        assert_eq!(t.extra_endpoints, vec!["https://a.example/", "https://b.example/"]);
    }
}
