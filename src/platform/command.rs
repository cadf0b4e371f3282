//! External command execution.
//!
//! Every interaction with `kubectl`, `helm`, `az`, `aws` and the host
//! firewall tools goes through [`CommandRunner`], so checks can be driven by
//! a scripted runner in tests.
//!
//! # Graceful Degradation
//!
//! - Program not on PATH: `PreflightError::MissingTool`
//! - Deadline exceeded: child is killed, `PreflightError::Timeout`
//! - Non-zero exit: returned as a normal `CommandOutput` for the caller to
//!   classify (use [`CommandRunner::run_ok`] to turn it into an error)
//! - Non-UTF8 output: lossy conversion

use crate::PreflightError;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line as a single string, for logs and scripted matching
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None when terminated by a signal)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First non-empty stderr line, falling back to stdout
    pub fn error_summary(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no output")
            .to_string()
    }
}

/// Runs external commands.
pub trait CommandRunner {
    /// Run to completion and capture stdout and stderr separately.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PreflightError>;

    /// Run, handing each output line (stdout and stderr combined) to
    /// `on_line` as it is produced. The returned output carries the combined
    /// text in `stdout`.
    fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, PreflightError> {
        let output = self.run(spec)?;
        let mut combined = String::new();
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            on_line(line);
            combined.push_str(line);
            combined.push('\n');
        }
        Ok(CommandOutput {
            exit_code: output.exit_code,
            stdout: combined,
            stderr: String::new(),
        })
    }

    /// Run and require a zero exit status.
    fn run_ok(&self, spec: &CommandSpec) -> Result<CommandOutput, PreflightError> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(PreflightError::CommandFailed {
                command: spec.display(),
                message: output.error_summary(),
            })
        }
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        SystemRunner
    }

    fn spawn(spec: &CommandSpec) -> Result<Child, PreflightError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PreflightError::MissingTool {
                tool: spec.program.clone(),
            },
            _ => PreflightError::io(format!("spawn {}", spec.program), e),
        })
    }

    /// Write the spec's stdin. On failure the child is killed and reaped.
    fn feed_stdin(child: &mut Child, spec: &CommandSpec) -> Result<(), PreflightError> {
        if let (Some(input), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                reap(child);
                return Err(PreflightError::io(format!("write stdin of {}", spec.program), e));
            }
        }
        Ok(())
    }

    /// Wait for the child, killing it once `deadline` has passed.
    fn wait(
        child: &mut Child,
        spec: &CommandSpec,
        deadline: Option<Instant>,
    ) -> Result<ExitStatus, PreflightError> {
        let Some(deadline) = deadline else {
            return child
                .wait()
                .map_err(|e| PreflightError::io(format!("wait for {}", spec.program), e));
        };

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    reap(child);
                    return Err(timed_out(spec));
                }
                Ok(None) => thread::sleep(Duration::from_millis(25)),
                Err(e) => return Err(PreflightError::io(format!("wait for {}", spec.program), e)),
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn timed_out(spec: &CommandSpec) -> PreflightError {
    PreflightError::Timeout {
        command: spec.display(),
        timeout_secs: spec.timeout.map_or(0, |t| t.as_secs()),
    }
}

fn read_to_string_thread<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn forward_lines_thread<R: Read + Send + 'static>(
    pipe: Option<R>,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Some(pipe) = pipe {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    })
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PreflightError> {
        debug!(command = %spec.display(), timeout_secs = ?spec.timeout.map(|t| t.as_secs()), "running command");
        let start = Instant::now();
        let deadline = spec.timeout.map(|t| start + t);

        let mut child = Self::spawn(spec)?;
        let stdout = read_to_string_thread(child.stdout.take());
        let stderr = read_to_string_thread(child.stderr.take());
        Self::feed_stdin(&mut child, spec)?;

        let status = Self::wait(&mut child, spec, deadline)?;
        let output = CommandOutput {
            exit_code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        debug!(
            command = %spec.program,
            exit_code = ?output.exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "command finished"
        );
        Ok(output)
    }

    fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, PreflightError> {
        debug!(command = %spec.display(), "running command with live output");
        let deadline = spec.timeout.map(|t| Instant::now() + t);

        let mut child = Self::spawn(spec)?;
        let (tx, rx) = mpsc::channel();
        let out_thread = forward_lines_thread(child.stdout.take(), tx.clone());
        let err_thread = forward_lines_thread(child.stderr.take(), tx);
        Self::feed_stdin(&mut child, spec)?;

        // Channel closes once both pipes hit EOF
        let mut combined = String::new();
        loop {
            let next = match deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let line = match next {
                Ok(line) => line,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    // Readers are left detached: a grandchild may still hold the pipes
                    debug!(command = %spec.program, lines = combined.lines().count(), "live output timed out");
                    reap(&mut child);
                    return Err(timed_out(spec));
                }
            };
            on_line(&line);
            combined.push_str(&line);
            combined.push('\n');
        }
        let _ = out_thread.join();
        let _ = err_thread.join();

        let status = Self::wait(&mut child, spec, deadline)?;
        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: combined,
            stderr: String::new(),
        })
    }
}
