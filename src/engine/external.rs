//! External check executables.
//!
//! An external check is any executable that prints `[KIND] message` lines.
//! It is run without arguments, with the run context exported as
//! environment variables, and its output is parsed line by line.

use crate::context::RunContext;
use crate::engine::reporter::Reporter;
use crate::platform::command::{CommandRunner, CommandSpec};
use crate::PreflightError;
use std::path::Path;
use tracing::debug;

/// Whether `path` is a regular file the current user may execute
pub fn is_runnable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn not_found(path: &Path, reporter: &mut Reporter) {
    reporter.skip(format!("check not found: {}", path.display()));
}

/// Run the executable at `path`, feeding its output to `reporter`.
///
/// A missing, non-executable or unspawnable file yields exactly one SKIP
/// line and never an error.
pub fn run_external(path: &Path, ctx: &RunContext, runner: &dyn CommandRunner, reporter: &mut Reporter) {
    debug!(path = %path.display(), "resolved external check");
    if !is_runnable(path) {
        not_found(path, reporter);
        return;
    }

    // A bare file name would otherwise be looked up on PATH
    let program = match path.canonicalize() {
        Ok(program) => program,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot resolve external check");
            not_found(path, reporter);
            return;
        }
    };
    debug!(program = %program.display(), "external check program");

    let spec = CommandSpec::new(program.to_string_lossy()).envs(ctx.to_env_vars());
    let result = runner.run_streaming(&spec, &mut |line| reporter.raw_line(line));
    match result {
        Ok(output) => {
            if !output.success() {
                let status = output
                    .exit_code
                    .map_or_else(|| "a signal".to_string(), |c| c.to_string());
                reporter.note(format!("{} exited with {}", path.display(), status));
            }
        }
        Err(PreflightError::MissingTool { .. }) | Err(PreflightError::Io { .. }) => {
            not_found(path, reporter);
        }
        Err(e) => reporter.fail(format!("unexpected error: {}", e)),
    }
}
