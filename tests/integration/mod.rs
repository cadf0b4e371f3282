//! Integration tests for k8s-preflight.
//!
//! These tests drive the orchestrator against scripted clusters and the
//! compiled binary against external check scripts.

pub mod cli_tests;
pub mod full_run_tests;
pub mod output_tests;
