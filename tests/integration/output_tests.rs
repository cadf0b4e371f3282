//! Output format integration tests.
//!
//! Tests for the terminal and JSON summaries.

use k8s_preflight::cli::output::{JsonFormatter, OutputFormatter, TerminalFormatter};
use k8s_preflight::context::EnvironmentKind;
use k8s_preflight::engine::result::{CheckSection, ResultAggregator, RunReport, NO_OUTPUT_MESSAGE};
use k8s_preflight::StatusLine;

fn section(key: &str, label: &str, lines: Vec<StatusLine>) -> CheckSection {
    CheckSection {
        key: key.to_string(),
        label: label.to_string(),
        icon: "*".to_string(),
        lines,
        output: String::new(),
        duration_ms: 12,
    }
}

fn report(sections: Vec<CheckSection>) -> RunReport {
    let mut aggregator = ResultAggregator::new(EnvironmentKind::Eks);
    for s in sections {
        aggregator.add_section(s);
    }
    aggregator.into_report(1500)
}

fn passing_report() -> RunReport {
    report(vec![
        section(
            "tools",
            "Tool versions",
            vec![
                StatusLine::pass("kubectl v1.30.4 meets minimum 1.29.0"),
                StatusLine::warn("kubectl client/server skew not checked"),
            ],
        ),
        section("firewall", "Host firewall", vec![StatusLine::skip("Host firewall does not apply to eks")]),
    ])
}

fn failing_report() -> RunReport {
    report(vec![
        section("tools", "Tool versions", vec![StatusLine::fail("helm is not installed or not on PATH")]),
        section("endpoints", "External endpoints", vec![StatusLine::fail("https://quay.io/ unreachable")]),
        section("database", "Database reachability", vec![]),
    ])
}

#[test]
fn test_terminal_passing_banner() {
    let text = TerminalFormatter::new(false).format(&passing_report());
    assert!(text.contains("Environment: eks"));
    assert!(text.contains("  [PASS] kubectl v1.30.4 meets minimum 1.29.0"));
    assert!(text.contains("SUMMARY: 1 passed, 1 warnings, 0 failed, 1 skipped across 2 checks"));
    assert!(text.contains("Total time: 1.5s"));
    assert!(text.ends_with("[PASS] preflight passed: 0 failing checks"));
}

#[test]
fn test_terminal_failing_banner_counts_checks() {
    let text = TerminalFormatter::new(false).format(&failing_report());
    assert!(text.ends_with("[FAIL] preflight failed: 2 failing checks"));

    let single = report(vec![section("tools", "Tool versions", vec![StatusLine::fail("x")])]);
    let text = TerminalFormatter::new(false).format(&single);
    assert!(text.ends_with("[FAIL] preflight failed: 1 failing check"));
}

#[test]
fn test_empty_section_renders_synthesized_skip() {
    let text = TerminalFormatter::new(false).format(&failing_report());
    assert!(text.contains(&format!("  [SKIP] {}", NO_OUTPUT_MESSAGE)));
}

#[test]
fn test_colored_output_still_parses() {
    let text = TerminalFormatter::new(true).format(&passing_report());
    assert!(text.contains('\x1b'));
    let lines = StatusLine::parse_all(&text);
    assert!(lines.contains(&StatusLine::pass("kubectl v1.30.4 meets minimum 1.29.0")));
    assert!(lines.contains(&StatusLine::pass("preflight passed: 0 failing checks")));
}

#[test]
fn test_empty_report() {
    let empty = report(vec![]);
    let text = TerminalFormatter::new(false).format(&empty);
    assert!(text.contains("across 0 checks"));

    let value: serde_json::Value = serde_json::from_str(&JsonFormatter::new(false).format(&empty)).unwrap();
    assert_eq!(value["exit_code"], 0);
    assert_eq!(value["sections"].as_array().unwrap().len(), 0);
}

#[test]
fn test_json_fields() {
    let output = JsonFormatter::new(true).format(&failing_report());
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value["environment"], "eks");
    assert_eq!(value["exit_code"], 1);
    assert_eq!(value["total_duration_ms"], 1500);
    assert_eq!(value["summary"]["failed"], 2);
    assert_eq!(value["summary"]["skipped"], 1);
    assert_eq!(value["summary"]["failing_checks"], 2);
    assert_eq!(value["summary"]["total_checks"], 3);

    let sections = value["sections"].as_array().unwrap();
    assert_eq!(sections[0]["key"], "tools");
    assert_eq!(sections[0]["lines"][0]["kind"], "fail");
    assert_eq!(sections[2]["lines"][0]["message"], NO_OUTPUT_MESSAGE);
}
