//! Temporary cluster resources with guaranteed cleanup.
//!
//! Checks that need pods on the cluster provision them inside a throwaway
//! namespace held by a [`Provisioned`] guard. The namespace is deleted when
//! the guard is released or dropped, so normal returns, early returns, `?`
//! propagation and panic unwinds all clean up. Names of live namespaces are
//! also kept in a process-wide registry consulted by the SIGINT/SIGTERM
//! handler installed with [`install_interrupt_cleanup`].

use crate::platform::command::{CommandRunner, CommandSpec, SystemRunner};
use crate::platform::kubectl::{Kubectl, Readiness, KUBECTL_CALL_TIMEOUT};
use crate::PreflightError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Exit status used when the run is interrupted
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Lifecycle of a provisioning check.
///
/// `Init -> NamespaceCreated -> PodsSubmitted -> ReadyOrTimeout -> ProbesRun
/// -> Cleanup -> Done`. Checks without pods go from `NamespaceCreated`
/// straight to `ProbesRun`. Every non-terminal phase may jump to `Cleanup`,
/// and `Done` is only reachable through `Cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    Init,
    NamespaceCreated,
    PodsSubmitted,
    ReadyOrTimeout,
    ProbesRun,
    Cleanup,
    Done,
}

impl ProvisionPhase {
    pub fn can_advance_to(self, next: ProvisionPhase) -> bool {
        use ProvisionPhase::*;
        match (self, next) {
            (Done, _) => false,
            (Cleanup, Done) => true,
            (Cleanup, _) => false,
            (_, Cleanup) => true,
            (Init, NamespaceCreated)
            | (NamespaceCreated, PodsSubmitted)
            | (NamespaceCreated, ProbesRun)
            | (PodsSubmitted, ReadyOrTimeout)
            | (ReadyOrTimeout, ProbesRun) => true,
            _ => false,
        }
    }
}

fn registry() -> MutexGuard<'static, BTreeSet<String>> {
    static LIVE: OnceLock<Mutex<BTreeSet<String>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(BTreeSet::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Temporary namespaces not yet released
pub fn live_namespaces() -> Vec<String> {
    registry().iter().cloned().collect()
}

/// Unique namespace name with the given prefix
pub fn temp_namespace_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

/// Scoped temporary namespace.
pub struct Provisioned<'a> {
    kubectl: Kubectl<'a>,
    namespace: String,
    phase: ProvisionPhase,
    history: Vec<ProvisionPhase>,
}

impl<'a> Provisioned<'a> {
    /// Create a fresh namespace named `<prefix>-<random>`.
    ///
    /// The name is registered before the create call so an interruption
    /// mid-request still deletes it.
    pub fn create(kubectl: Kubectl<'a>, prefix: &str) -> Result<Self, PreflightError> {
        let namespace = temp_namespace_name(prefix);
        registry().insert(namespace.clone());

        let mut guard = Provisioned {
            kubectl,
            namespace,
            phase: ProvisionPhase::Init,
            history: vec![ProvisionPhase::Init],
        };

        // On failure the guard drops here and runs cleanup
        guard.kubectl.create_namespace(&guard.namespace)?;
        guard.advance(ProvisionPhase::NamespaceCreated);
        debug!(namespace = %guard.namespace, "temporary namespace created");
        Ok(guard)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn phase(&self) -> ProvisionPhase {
        self.phase
    }

    /// Phases visited so far, in order
    pub fn history(&self) -> &[ProvisionPhase] {
        &self.history
    }

    pub fn kubectl(&self) -> Kubectl<'a> {
        self.kubectl
    }

    fn advance(&mut self, next: ProvisionPhase) {
        if self.phase == next {
            return;
        }
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid provisioning transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(namespace = %self.namespace, from = ?self.phase, to = ?next, "provision phase");
        self.phase = next;
        self.history.push(next);
    }

    /// Apply a workload manifest into the namespace
    pub fn submit<T: Serialize>(&mut self, manifest: &T) -> Result<(), PreflightError> {
        self.kubectl.apply(&self.namespace, manifest)?;
        self.advance(ProvisionPhase::PodsSubmitted);
        Ok(())
    }

    /// Wait for every target (`daemonset/x`, `pod/y`) to become ready
    /// within `timeout` each. On timeout the namespace is released at once.
    pub fn await_ready(&mut self, targets: &[String], timeout: Duration) -> Result<Readiness, PreflightError> {
        let deadline = Instant::now() + timeout;
        for target in targets {
            let Some(budget) = whole_secs_left(deadline) else {
                self.release();
                return Ok(Readiness::NotReady(format!(
                    "{}: not ready within {}s",
                    target,
                    timeout.as_secs()
                )));
            };
            let readiness = match target.strip_prefix("pod/") {
                Some(pod) => self.kubectl.wait_pod_ready(&self.namespace, pod, budget)?,
                None => self.kubectl.rollout_status(&self.namespace, target, budget)?,
            };
            if let Readiness::NotReady(reason) = readiness {
                self.release();
                return Ok(Readiness::NotReady(format!("{}: {}", target, reason)));
            }
        }
        self.advance(ProvisionPhase::ReadyOrTimeout);
        Ok(Readiness::Ready)
    }

    /// Mark the start of probing
    pub fn begin_probes(&mut self) {
        self.advance(ProvisionPhase::ProbesRun);
    }

    /// Delete the namespace. Idempotent; failures are logged, not raised.
    pub fn release(&mut self) {
        if matches!(self.phase, ProvisionPhase::Cleanup | ProvisionPhase::Done) {
            return;
        }
        self.advance(ProvisionPhase::Cleanup);

        if let Err(e) = self.kubectl.delete_namespace(&self.namespace) {
            warn!(namespace = %self.namespace, error = %e, "failed to delete temporary namespace");
        }
        registry().remove(&self.namespace);

        self.advance(ProvisionPhase::Done);
        debug!(namespace = %self.namespace, "temporary namespace released");
    }
}

/// Time left until `deadline`, rounded up to whole seconds for kubectl
fn whole_secs_left(deadline: Instant) -> Option<Duration> {
    let left = deadline.checked_duration_since(Instant::now())?;
    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Drop for Provisioned<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Delete every live temporary namespace with `runner`. Returns the names
/// a delete was issued for.
pub fn cleanup_live_namespaces(runner: &dyn CommandRunner) -> Vec<String> {
    let names: Vec<String> = std::mem::take(&mut *registry()).into_iter().collect();
    for name in &names {
        let spec = CommandSpec::new("kubectl")
            .args(["delete", "namespace", name, "--ignore-not-found", "--wait=false"])
            .timeout(KUBECTL_CALL_TIMEOUT);
        if let Err(e) = runner.run(&spec) {
            warn!(namespace = %name, error = %e, "interrupt cleanup failed");
        }
    }
    names
}

/// Install a SIGINT/SIGTERM handler that deletes live temporary namespaces
/// and exits with status 130.
pub fn install_interrupt_cleanup() -> Result<(), PreflightError> {
    ctrlc::set_handler(|| {
        let removed = cleanup_live_namespaces(&SystemRunner::new());
        if !removed.is_empty() {
            eprintln!("interrupted: deleted temporary namespaces {}", removed.join(", "));
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .map_err(|e| PreflightError::Config(format!("cannot install interrupt handler: {}", e)))
}
