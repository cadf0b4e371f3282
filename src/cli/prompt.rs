//! Interactive resolution of settings not given by flag or environment.

use crate::cli::args::Args;
use crate::context::{DbEndpoint, EnvironmentKind, RunContext};
use crate::PreflightError;
use std::io::{BufRead, Write};

const MAX_ATTEMPTS: usize = 3;

fn io_err(e: std::io::Error) -> PreflightError {
    PreflightError::io("interactive prompt", e)
}

/// Print `question` and read one trimmed line; `None` on end of input
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<Option<String>, PreflightError> {
    write!(output, "{}", question).map_err(io_err)?;
    output.flush().map_err(io_err)?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(io_err)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn choose_environment<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<EnvironmentKind, PreflightError> {
    writeln!(output, "Select target environment:").map_err(io_err)?;
    for (i, env) in EnvironmentKind::ALL.iter().enumerate() {
        writeln!(output, "  {}) {}", i + 1, env).map_err(io_err)?;
    }

    for _ in 0..MAX_ATTEMPTS {
        let Some(answer) = ask(input, output, "Environment [1-3]: ")? else {
            break;
        };
        let by_index = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| EnvironmentKind::ALL.get(i).copied());
        match by_index.map(Ok).unwrap_or_else(|| answer.parse()) {
            Ok(env) => return Ok(env),
            Err(_) => writeln!(output, "  '{}' is not a valid choice", answer).map_err(io_err)?,
        }
    }

    Err(PreflightError::Config("no environment selected".to_string()))
}

fn ask_optional<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<Option<String>, PreflightError> {
    Ok(ask(input, output, question)?.filter(|s| !s.is_empty()))
}

fn ask_db_endpoints<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Vec<DbEndpoint>, PreflightError> {
    for _ in 0..MAX_ATTEMPTS {
        let Some(answer) = ask(
            input,
            output,
            "Database endpoints host[:port], comma separated (empty to skip): ",
        )?
        else {
            return Ok(Vec::new());
        };
        match DbEndpoint::parse_list(&answer) {
            Ok(list) => return Ok(list),
            Err(e) => writeln!(output, "  {}", e).map_err(io_err)?,
        }
    }
    Err(PreflightError::Config("invalid database endpoints".to_string()))
}

/// Build the run context from arguments, prompting for what is missing
/// when `interactive`.
pub fn resolve_context<R: BufRead, W: Write>(
    args: &Args,
    interactive: bool,
    input: &mut R,
    output: &mut W,
) -> Result<RunContext, PreflightError> {
    let environment = match args.environment {
        Some(env) => env,
        None if interactive => choose_environment(input, output)?,
        None => {
            return Err(PreflightError::Config(
                "ENVIRONMENT is required (use -e/--environment aks|eks|k3s)".to_string(),
            ))
        }
    };

    let mut resource_group = args.resource_group.clone().filter(|s| !s.is_empty());
    let mut cluster_name = args.cluster_name.clone().filter(|s| !s.is_empty());
    if interactive {
        if environment == EnvironmentKind::Aks && resource_group.is_none() {
            resource_group = ask_optional(input, output, "Azure resource group: ")?;
        }
        if environment.is_cloud() && cluster_name.is_none() {
            cluster_name = ask_optional(input, output, "Cluster name: ")?;
        }
    }

    let db_endpoints = match &args.db_endpoints {
        Some(list) => list.0.clone(),
        None if interactive => ask_db_endpoints(input, output)?,
        None => Vec::new(),
    };

    Ok(RunContext::new(environment)
        .with_cluster(resource_group.as_deref(), cluster_name.as_deref())
        .with_db_endpoints(db_endpoints)
        .with_target_namespace(args.target_namespace.clone())
        .with_tunables(args.tunables()))
}
