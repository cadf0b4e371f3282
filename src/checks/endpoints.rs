//! Outbound reachability of the external endpoints the platform pulls from.

use crate::checks::EGRESS_HINT;
use crate::data::requirements::endpoints_for;
use crate::engine::orchestrator::CheckContext;
use crate::engine::reporter::Reporter;
use crate::platform::network::url_host;
use crate::PreflightError;
use tracing::debug;

fn probe(ctx: &CheckContext<'_>, url: &str, reporter: &mut Reporter) {
    let Some(host) = url_host(url) else {
        reporter.fail(format!("{} is not an http(s) URL", url));
        return;
    };

    let timeout = ctx.run.tunables.http_timeout;
    match ctx.network.resolve(host, timeout) {
        Ok(addrs) => debug!(host, resolved = ?addrs, "resolved"),
        Err(e) => {
            reporter.fail(format!("{} does not resolve: {}; {}", host, e, EGRESS_HINT));
            return;
        }
    }

    match ctx.network.http_request(url, timeout) {
        // Any status proves the path; registries answer 401 anonymously
        Ok(result) => reporter.pass(format!(
            "{} reachable (HTTP {}, {}ms)",
            url, result.status_code, result.latency_ms
        )),
        Err(e) => reporter.fail(format!("{} unreachable: {}; {}", url, e, EGRESS_HINT)),
    }
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let builtin = endpoints_for(ctx.environment());
    let mut urls: Vec<&str> = builtin.clone();
    for extra in &ctx.run.tunables.extra_endpoints {
        if !urls.contains(&extra.as_str()) {
            urls.push(extra);
        }
    }
    debug!(count = urls.len(), builtin = builtin.len(), "external endpoints");

    for url in urls {
        probe(ctx, url, reporter);
    }
    Ok(())
}
