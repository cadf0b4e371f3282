//! Admission dry-run of the privileged workload shapes the platform deploys.
//!
//! Each synthetic pod is submitted with `--dry-run=server`, so admission
//! webhooks and Pod Security Admission evaluate it but nothing is stored.

use crate::data::requirements::PSA_ENFORCE_LABEL;
use crate::engine::orchestrator::CheckContext;
use crate::engine::provision::Provisioned;
use crate::engine::reporter::Reporter;
use crate::platform::kubectl::{label, DryRunOutcome};
use crate::PreflightError;
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Pod, PodSecurityContext, PodSpec, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

const NAMESPACE_PREFIX: &str = "preflight-adm";

/// Privileged shape exercised by a dry run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Privileged,
    HostPath,
    RootUser,
    HostNetwork,
}

impl Shape {
    const ALL: [Shape; 4] = [Shape::Privileged, Shape::HostPath, Shape::RootUser, Shape::HostNetwork];

    fn slug(self) -> &'static str {
        match self {
            Shape::Privileged => "privileged",
            Shape::HostPath => "hostpath",
            Shape::RootUser => "root-user",
            Shape::HostNetwork => "host-network",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Shape::Privileged => "privileged container",
            Shape::HostPath => "hostPath mount",
            Shape::RootUser => "root user",
            Shape::HostNetwork => "host networking",
        }
    }

    fn manifest(self, image: &str) -> Pod {
        let mut container = Container {
            name: "probe".to_string(),
            image: Some(image.to_string()),
            command: Some(vec!["sleep".to_string(), "1".to_string()]),
            ..Default::default()
        };
        let mut spec = PodSpec::default();

        match self {
            Shape::Privileged => {
                container.security_context = Some(SecurityContext {
                    privileged: Some(true),
                    ..Default::default()
                });
            }
            Shape::HostPath => {
                container.volume_mounts = Some(vec![VolumeMount {
                    name: "host-logs".to_string(),
                    mount_path: "/host/var/log".to_string(),
                    read_only: Some(true),
                    ..Default::default()
                }]);
                spec.volumes = Some(vec![Volume {
                    name: "host-logs".to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: "/var/log".to_string(),
                        type_: Some("Directory".to_string()),
                    }),
                    ..Default::default()
                }]);
            }
            Shape::RootUser => {
                spec.security_context = Some(PodSecurityContext {
                    run_as_user: Some(0),
                    run_as_non_root: Some(false),
                    ..Default::default()
                });
            }
            Shape::HostNetwork => {
                spec.host_network = Some(true);
            }
        }

        spec.containers = vec![container];
        Pod {
            metadata: ObjectMeta {
                name: Some(format!("preflight-{}", self.slug())),
                ..Default::default()
            },
            spec: Some(spec),
            ..Default::default()
        }
    }
}

/// PSA enforce level of `namespace`, if any; `Ok(None)` when the
/// namespace does not exist
fn inspect_target(
    ctx: &CheckContext<'_>,
    namespace: &str,
) -> Result<Option<Option<String>>, PreflightError> {
    let found = ctx.kubectl().get_namespace(namespace)?;
    Ok(found.map(|ns| label(&ns.metadata, PSA_ENFORCE_LABEL).map(str::to_string)))
}

pub fn run(ctx: &CheckContext<'_>, reporter: &mut Reporter) -> Result<(), PreflightError> {
    let target = ctx.run.target_namespace.as_str();
    let inspected = match inspect_target(ctx, target) {
        Ok(inspected) => inspected,
        Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
        Err(e) => {
            reporter.fail(format!("cannot read namespace {}: {}", target, e));
            return Ok(());
        }
    };

    let mut guard = None;
    let (namespace, enforce) = match inspected {
        Some(enforce) => (target.to_string(), enforce),
        None => {
            let created = Provisioned::create(ctx.kubectl(), NAMESPACE_PREFIX)?;
            reporter.note(format!(
                "namespace {} not found; dry-running in {}",
                target,
                created.namespace()
            ));
            let namespace = created.namespace().to_string();
            guard = Some(created);
            (namespace, None)
        }
    };

    match enforce.as_deref() {
        Some("restricted") => reporter.warn(format!(
            "namespace {} enforces Pod Security 'restricted'; platform components need a privileged namespace",
            namespace
        )),
        Some(level) => reporter.note(format!("namespace {} enforces Pod Security '{}'", namespace, level)),
        None => {}
    }

    if let Some(g) = guard.as_mut() {
        g.begin_probes();
    }

    let kubectl = ctx.kubectl();
    for shape in Shape::ALL {
        let outcome = kubectl.dry_run(&namespace, &shape.manifest(&ctx.run.tunables.client_image));
        match outcome {
            Ok(DryRunOutcome::Accepted) => {
                reporter.pass(format!("{} pod admitted in {}", shape.describe(), namespace))
            }
            Ok(DryRunOutcome::Rejected(reason)) => {
                let context = enforce
                    .as_deref()
                    .map(|level| format!(" ({}={})", PSA_ENFORCE_LABEL, level))
                    .unwrap_or_default();
                reporter.fail(format!(
                    "{} pod rejected in {}{}: {}",
                    shape.describe(),
                    namespace,
                    context,
                    reason
                ));
            }
            Err(e @ PreflightError::MissingTool { .. }) => return Err(e),
            Err(e) => reporter.fail(format!("{} dry run failed: {}", shape.describe(), e)),
        }
    }

    if let Some(mut g) = guard {
        g.release();
    }
    Ok(())
}
