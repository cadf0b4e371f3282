//! Network reachability probes run from the host executing the preflight.
//!
//! Provides DNS resolution, TCP connectivity, and HTTP(S) endpoint checking.
//!
//! # Graceful Degradation
//!
//! - DNS failures: `PreflightError::Network` with hostname context
//! - Slow resolver: lookup abandoned at the deadline, `PreflightError::Network`
//! - Connection timeout or refusal: `PreflightError::Network`
//! - HTTP error statuses: returned in `HttpResult` for the caller to classify
//! - TLS failures: `PreflightError::Network`
//!
//! Every operation takes an explicit timeout. No function will block
//! indefinitely or panic.

use crate::PreflightError;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP endpoint result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResult {
    pub status_code: u16,
    pub latency_ms: u64,
}

/// Reachability probes used by the endpoint and firewall checks.
pub trait NetworkProbe {
    /// Resolve a hostname to its addresses within `timeout`.
    fn resolve(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, PreflightError>;

    /// Open (and immediately close) a TCP connection, returning the latency.
    fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Duration, PreflightError>;

    /// Issue a GET without following redirects. Any HTTP response counts.
    fn http_request(&self, url: &str, timeout: Duration) -> Result<HttpResult, PreflightError>;
}

/// Probes against the real network.
pub struct SystemNetwork {
    client: reqwest::blocking::Client,
}

impl SystemNetwork {
    pub fn new() -> Result<Self, PreflightError> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("k8s-preflight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PreflightError::Network {
                target: "http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(SystemNetwork { client })
    }
}

/// Error for a lookup that did not finish within `timeout`
pub fn dns_timeout(host: &str, timeout: Duration) -> PreflightError {
    PreflightError::Network {
        target: host.to_string(),
        message: format!("DNS resolution timed out after {}s", timeout.as_secs()),
    }
}

/// Run `job` on a worker thread and wait at most `timeout` for its result.
///
/// The system resolver has no deadline of its own; an abandoned worker
/// finishes in the background and its result is dropped.
fn with_deadline<T, F>(timeout: Duration, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });
    rx.recv_timeout(timeout).ok()
}

fn socket_addrs(host: &str, port: u16, timeout: Duration) -> Result<Vec<SocketAddr>, PreflightError> {
    let owned = host.to_string();
    let lookup = with_deadline(timeout, move || {
        (owned.as_str(), port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<SocketAddr>>())
    })
    .ok_or_else(|| dns_timeout(host, timeout))?;

    let addrs = lookup.map_err(|e| PreflightError::Network {
        target: host.to_string(),
        message: format!("DNS resolution failed: {}", e),
    })?;

    if addrs.is_empty() {
        return Err(PreflightError::Network {
            target: host.to_string(),
            message: "no addresses returned".to_string(),
        });
    }
    Ok(addrs)
}

impl NetworkProbe for SystemNetwork {
    fn resolve(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, PreflightError> {
        let start = Instant::now();
        let addrs = socket_addrs(host, 443, timeout)?;
        debug!(host, elapsed_ms = start.elapsed().as_millis() as u64, "resolved");
        Ok(addrs.into_iter().map(|a| a.ip()).collect())
    }

    fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Duration, PreflightError> {
        let start = Instant::now();
        let target = format!("{}:{}", host, port);

        let mut last_error = None;
        for addr in socket_addrs(host, port, timeout)? {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(_stream) => return Ok(start.elapsed()),
                Err(e) => last_error = Some(e),
            }
        }

        Err(PreflightError::Network {
            target,
            message: last_error.map_or_else(
                || format!("no connection within {}s", timeout.as_secs()),
                |e| e.to_string(),
            ),
        })
    }

    fn http_request(&self, url: &str, timeout: Duration) -> Result<HttpResult, PreflightError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| PreflightError::Network {
                target: url.to_string(),
                message: if e.is_timeout() {
                    format!("no response within {}s", timeout.as_secs())
                } else {
                    e.to_string()
                },
            })?;

        Ok(HttpResult {
            status_code: response.status().as_u16(),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Host portion of an `http(s)://host[:port]/path` URL
pub fn url_host(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    let host = if let Some(v6) = authority.strip_prefix('[') {
        v6.split_once(']').map(|(h, _)| h)?
    } else {
        authority.split(':').next()?
    };
    (!host.is_empty()).then_some(host)
}
