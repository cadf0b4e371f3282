//! k8s-preflight CLI entry point
//!
//! Preflight validation for Kubernetes platform deployments on AKS, EKS and
//! on-prem K3s.

use k8s_preflight::cli::args::Args;
use k8s_preflight::cli::output::get_formatter;
use k8s_preflight::cli::prompt::resolve_context;
use k8s_preflight::engine::orchestrator::create_all_checks;
use k8s_preflight::engine::provision::install_interrupt_cleanup;
use k8s_preflight::version::get_build_info;
use k8s_preflight::{run_preflight, PreflightConfig};

use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status for usage and configuration errors
const USAGE_EXIT_CODE: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("{}", get_build_info());
        return ExitCode::SUCCESS;
    }

    init_tracing(args.debug);

    if args.list {
        print_check_list();
        return ExitCode::SUCCESS;
    }

    run_checks(&args)
}

/// Logs go to stderr so stdout stays the report. `RUST_LOG` overrides.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if debug {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

fn print_check_list() {
    println!("Available checks (run in this order):");
    println!();
    for check in create_all_checks() {
        let envs: Vec<&str> = check.environments().iter().map(|e| e.as_str()).collect();
        println!("  {:<16} {:<32} [{}]", check.key, check.label, envs.join(", "));
    }
    println!();
    println!("External checks added with --extra-check run after these, keyed by file name.");
}

fn run_checks(args: &Args) -> ExitCode {
    let interactive = !args.non_interactive && std::io::stdin().is_terminal();
    let mut input = std::io::stdin().lock();
    let mut output = std::io::stderr();
    let ctx = match resolve_context(args, interactive, &mut input, &mut output) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'k8s-preflight --help' for usage information.");
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };
    debug!(context = ?ctx, "resolved run context");

    if let Err(e) = install_interrupt_cleanup() {
        warn!(error = %e, "temporary namespaces will not be cleaned up on interrupt");
    }

    let config = PreflightConfig::from_args(args);
    for path in &config.extra_checks {
        debug!(path = %path.display(), "external check");
    }

    let report = match run_preflight(&ctx, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };

    let formatter = get_formatter(args.format, config.color);
    println!("{}", formatter.format(&report));

    ExitCode::from(report.exit_code())
}
