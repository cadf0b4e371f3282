//! Scripted fakes for the platform traits (testing only)
//!
//! `FakeRunner` answers commands by pattern over their display string and
//! records every invocation; `FakeNetwork` answers probes from lookup
//! tables. Neither touches the host.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::platform::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::platform::network::{dns_timeout, HttpResult, NetworkProbe};
use crate::PreflightError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// FakeRunner
// ---------------------------------------------------------------------------

/// Canned reaction to a command.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Output(CommandOutput),
    /// Output returned after sleeping, for callers that budget time
    Delayed(Duration, CommandOutput),
    MissingTool,
    Timeout,
}

impl FakeResponse {
    /// Exit 0 with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        FakeResponse::Output(CommandOutput {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }

    /// Non-zero exit with the given stderr
    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        FakeResponse::Output(CommandOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }
}

/// How a rule selects commands
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Prefix(String),
    /// Anywhere in the command line; for commands carrying generated names
    Contains(String),
}

impl Pattern {
    fn matches(&self, line: &str) -> bool {
        match self {
            Pattern::Prefix(p) => line.starts_with(p.as_str()),
            Pattern::Contains(f) => line.contains(f.as_str()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Pattern::Prefix(p) | Pattern::Contains(p) => p.len(),
        }
    }
}

/// Command runner answering from a script.
///
/// The rule with the longest matching pattern wins. Commands with no
/// matching rule fail with `CommandFailed`.
#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<(Pattern, FakeResponse)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for every command starting with `prefix`.
    pub fn on(self, prefix: impl Into<String>, response: FakeResponse) -> Self {
        self.script(prefix, response);
        self
    }

    /// Script a response for every command containing `fragment`.
    pub fn on_contains(self, fragment: impl Into<String>, response: FakeResponse) -> Self {
        self.add_rule(Pattern::Contains(fragment.into()), response);
        self
    }

    /// Non-consuming variant of [`FakeRunner::on`]
    pub fn script(&self, prefix: impl Into<String>, response: FakeResponse) {
        self.add_rule(Pattern::Prefix(prefix.into()), response);
    }

    fn add_rule(&self, pattern: Pattern, response: FakeResponse) {
        let mut rules = lock(&self.rules);
        rules.retain(|(p, _)| *p != pattern);
        rules.push((pattern, response));
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Display strings of every command run so far
    pub fn call_lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(CommandSpec::display).collect()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        lock(&self.calls).iter().any(|c| c.display().starts_with(prefix))
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.display().starts_with(prefix))
            .count()
    }

    /// Calls whose command line contains `fragment`
    pub fn calls_containing(&self, fragment: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(CommandSpec::display)
            .filter(|line| line.contains(fragment))
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PreflightError> {
        let line = spec.display();
        lock(&self.calls).push(spec.clone());

        let response = lock(&self.rules)
            .iter()
            .filter(|(pattern, _)| pattern.matches(&line))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, r)| r.clone());

        match response {
            Some(FakeResponse::Output(output)) => Ok(output),
            Some(FakeResponse::Delayed(delay, output)) => {
                std::thread::sleep(delay);
                Ok(output)
            }
            Some(FakeResponse::MissingTool) => Err(PreflightError::MissingTool {
                tool: spec.program.clone(),
            }),
            Some(FakeResponse::Timeout) => Err(PreflightError::Timeout {
                command: line,
                timeout_secs: spec.timeout.map_or(0, |t| t.as_secs()),
            }),
            None => Err(PreflightError::CommandFailed {
                command: line,
                message: "no scripted response".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeNetwork
// ---------------------------------------------------------------------------

/// Network probe answering from lookup tables.
///
/// Unknown hosts fail to resolve; unknown TCP targets are unreachable;
/// unknown URLs time out.
#[derive(Debug, Default)]
pub struct FakeNetwork {
    hosts: Mutex<HashMap<String, Vec<IpAddr>>>,
    slow_hosts: Mutex<Vec<String>>,
    open_ports: Mutex<Vec<(String, u16)>>,
    urls: Mutex<HashMap<String, u16>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, host: &str, ip: IpAddr) -> Self {
        lock(&self.hosts).entry(host.to_string()).or_default().push(ip);
        self
    }

    /// A host whose lookup never completes within the caller's deadline
    pub fn with_slow_host(self, host: &str) -> Self {
        lock(&self.slow_hosts).push(host.to_string());
        self
    }

    pub fn with_open_port(self, host: &str, port: u16) -> Self {
        lock(&self.open_ports).push((host.to_string(), port));
        self
    }

    pub fn with_url(self, url: &str, status_code: u16) -> Self {
        lock(&self.urls).insert(url.to_string(), status_code);
        self
    }
}

impl NetworkProbe for FakeNetwork {
    fn resolve(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, PreflightError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        if lock(&self.slow_hosts).iter().any(|h| h == host) {
            return Err(dns_timeout(host, timeout));
        }
        lock(&self.hosts)
            .get(host)
            .cloned()
            .ok_or_else(|| PreflightError::Network {
                target: host.to_string(),
                message: "DNS resolution failed: name not known".to_string(),
            })
    }

    fn tcp_connect(&self, host: &str, port: u16, _timeout: Duration) -> Result<Duration, PreflightError> {
        if lock(&self.open_ports).iter().any(|(h, p)| h == host && *p == port) {
            Ok(Duration::from_millis(1))
        } else {
            Err(PreflightError::Network {
                target: format!("{}:{}", host, port),
                message: "connection refused".to_string(),
            })
        }
    }

    fn http_request(&self, url: &str, timeout: Duration) -> Result<HttpResult, PreflightError> {
        lock(&self.urls)
            .get(url)
            .map(|status| HttpResult {
                status_code: *status,
                latency_ms: 5,
            })
            .ok_or_else(|| PreflightError::Network {
                target: url.to_string(),
                message: format!("no response within {}s", timeout.as_secs()),
            })
    }
}
