//! Full run integration tests.
//!
//! Tests for complete runs of the nine built-in checks against scripted
//! clusters, including environment gating, exit status and cleanup of
//! temporary namespaces.

use crate::mocks::MockClusterConfig;
use k8s_preflight::context::{DbEndpoint, EnvironmentKind, RunContext};
use k8s_preflight::engine::provision::live_namespaces;
use k8s_preflight::engine::result::RunReport;
use k8s_preflight::platform::fake::FakeRunner;
use k8s_preflight::{build_orchestrator, PreflightConfig, PreflightError, StatusKind};

fn context(env: EnvironmentKind) -> RunContext {
    match env {
        EnvironmentKind::Aks => RunContext::new(env).with_cluster(Some("rg-platform"), Some("aks-prod")),
        EnvironmentKind::Eks => RunContext::new(env).with_cluster(None, Some("eks-prod")),
        EnvironmentKind::K3s => RunContext::new(env),
    }
}

fn run(mock: &MockClusterConfig, ctx: &RunContext) -> (RunReport, FakeRunner) {
    let runner = mock.runner();
    let network = mock.network();
    let report = build_orchestrator(&PreflightConfig::default(), &runner, &network).run_all(ctx);
    (report, runner)
}

fn section<'r>(report: &'r RunReport, key: &str) -> &'r k8s_preflight::CheckSection {
    report
        .sections
        .iter()
        .find(|s| s.key == key)
        .unwrap_or_else(|| panic!("no section {}", key))
}

fn kinds(report: &RunReport, key: &str) -> Vec<StatusKind> {
    section(report, key).lines.iter().map(|l| l.kind).collect()
}

fn assert_exit_code_matches_lines(report: &RunReport) {
    let any_fail = report
        .sections
        .iter()
        .flat_map(|s| s.lines.iter())
        .any(|l| l.kind == StatusKind::Fail);
    assert_eq!(report.exit_code(), u8::from(any_fail));
}

#[test]
fn test_healthy_clusters_pass_in_every_environment() {
    for env in EnvironmentKind::ALL {
        let mock = MockClusterConfig::healthy(env);
        let (report, _) = run(&mock, &context(env));

        assert_eq!(report.sections.len(), 9);
        assert_eq!(report.summary().failed, 0, "{:#?}", report.sections);
        assert_eq!(report.exit_code(), 0);
        assert_exit_code_matches_lines(&report);
    }
}

#[test]
fn test_sections_follow_declared_order() {
    let (report, _) = run(&MockClusterConfig::healthy(EnvironmentKind::K3s), &context(EnvironmentKind::K3s));
    let keys: Vec<_> = report.sections.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "tools",
            "instance-types",
            "node-labels",
            "firewall",
            "connectivity",
            "endpoints",
            "network-policy",
            "admission",
            "database"
        ]
    );
}

#[test]
fn test_inapplicable_checks_only_skip() {
    let (report, runner) = run(&MockClusterConfig::healthy(EnvironmentKind::Aks), &context(EnvironmentKind::Aks));
    for key in ["firewall", "connectivity"] {
        assert_eq!(kinds(&report, key), vec![StatusKind::Skip]);
    }
    assert!(!runner.was_called("firewall-cmd"));
    assert!(!runner.was_called("kubectl rollout status"));

    let (report, runner) = run(&MockClusterConfig::healthy(EnvironmentKind::K3s), &context(EnvironmentKind::K3s));
    assert_eq!(kinds(&report, "instance-types"), vec![StatusKind::Skip]);
    assert!(!runner.was_called("az"));
    assert!(!runner.was_called("aws"));
}

#[test]
fn test_k3s_without_databases_skips_once_and_creates_no_db_namespace() {
    let (report, runner) = run(&MockClusterConfig::healthy(EnvironmentKind::K3s), &context(EnvironmentKind::K3s));
    assert_eq!(kinds(&report, "database"), vec![StatusKind::Skip]);
    assert!(runner.calls_containing("preflight-db-").is_empty());
}

#[test]
fn test_aks_proxy_b2s_v2_is_allowed() {
    let (report, _) = run(&MockClusterConfig::healthy(EnvironmentKind::Aks), &context(EnvironmentKind::Aks));
    let lines = &section(&report, "instance-types").lines;
    let proxy = lines.iter().find(|l| l.message.contains("node pool proxy")).unwrap();
    assert_eq!(proxy.kind, StatusKind::Pass);
    assert!(proxy.message.ends_with("Standard_B2s_V2"));
}

#[test]
fn test_disallowed_machine_type_fails_run() {
    let mock = MockClusterConfig::healthy(EnvironmentKind::Aks).with_machine_type("workers", "Standard_NC6s_v3");
    let (report, _) = run(&mock, &context(EnvironmentKind::Aks));

    assert_eq!(report.exit_code(), 1);
    let summary = report.summary();
    assert_eq!(summary.failing_checks, 1);
    assert!(section(&report, "instance-types").has_failures());
    assert_exit_code_matches_lines(&report);
}

#[test]
fn test_missing_cluster_name_fails_one_check_only() {
    let mock = MockClusterConfig::healthy(EnvironmentKind::Eks);
    let (report, runner) = run(&mock, &RunContext::new(EnvironmentKind::Eks));

    assert_eq!(report.sections.len(), 9);
    let lines = &section(&report, "instance-types").lines;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].kind, StatusKind::Fail);
    assert!(lines[0].message.contains("CLUSTER_NAME"));
    assert!(!runner.was_called("aws eks"));
    assert!(!section(&report, "tools").has_failures());
}

#[test]
fn test_restricted_admission_warns_and_fails() {
    let mock = MockClusterConfig::healthy(EnvironmentKind::Eks).with_restricted_admission();
    let (report, _) = run(&mock, &context(EnvironmentKind::Eks));

    let admission = kinds(&report, "admission");
    assert_eq!(admission[0], StatusKind::Warn);
    assert_eq!(admission.iter().filter(|k| **k == StatusKind::Fail).count(), 4);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_database_probe_cleans_up_temporary_namespace() {
    let mock = MockClusterConfig::healthy(EnvironmentKind::K3s).with_reachable_database("db1.internal");
    let ctx = context(EnvironmentKind::K3s)
        .with_db_endpoints(DbEndpoint::parse_list("db1.internal,db2.internal:6432").unwrap());
    let (report, runner) = run(&mock, &ctx);

    assert_eq!(kinds(&report, "database"), vec![StatusKind::Pass, StatusKind::Fail]);

    let created: Vec<String> = runner
        .calls_containing("kubectl apply -n preflight-db-")
        .iter()
        .filter_map(|line| line.split_whitespace().nth(3).map(str::to_string))
        .collect();
    assert_eq!(created.len(), 1);
    assert!(runner.was_called(&format!("kubectl delete namespace {}", created[0])));
    assert!(!live_namespaces().contains(&created[0]));
}

#[test]
fn test_connectivity_mesh_covers_every_pair() {
    let (report, runner) = run(&MockClusterConfig::healthy(EnvironmentKind::K3s), &context(EnvironmentKind::K3s));
    let lines = &section(&report, "connectivity").lines;
    // 3 clients x (3 servers + service DNS + cluster DNS)
    assert_eq!(lines.len(), 15);
    assert!(lines.iter().all(|l| l.kind == StatusKind::Pass));
    assert_eq!(runner.calls_containing(" -- nc -z ").len(), 12);
}

#[test]
fn test_unreachable_endpoints_fail_with_hint() {
    let mut mock = MockClusterConfig::healthy(EnvironmentKind::Eks);
    mock.endpoints_reachable = false;
    let (report, _) = run(&mock, &context(EnvironmentKind::Eks));

    let lines = &section(&report, "endpoints").lines;
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| l.kind == StatusKind::Fail));
    assert!(lines[0].message.contains("proxy settings"));
    assert_exit_code_matches_lines(&report);
}

#[test]
fn test_selection_by_key() {
    let mock = MockClusterConfig::healthy(EnvironmentKind::K3s);
    let runner = mock.runner();
    let network = mock.network();
    let orchestrator = build_orchestrator(&PreflightConfig::default(), &runner, &network);
    let ctx = context(EnvironmentKind::K3s);

    let report = orchestrator
        .run_specific(&ctx, &["endpoints".to_string(), "tools".to_string()])
        .unwrap();
    let keys: Vec<_> = report.sections.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["tools", "endpoints"]);

    let report = orchestrator
        .run_excluding(&ctx, &["connectivity".to_string()])
        .unwrap();
    assert_eq!(report.sections.len(), 8);

    let err = orchestrator
        .run_specific(&ctx, &["gpu".to_string()])
        .unwrap_err();
    assert!(matches!(err, PreflightError::Config(_)));
}
