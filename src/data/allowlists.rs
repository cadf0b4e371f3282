//! Per-pool instance type allow-lists and machine type normalization.

use crate::context::EnvironmentKind;

/// Node pools the platform expects, in report order
pub const POOLS: [&str; 3] = ["system", "proxy", "workers"];

const AKS_SYSTEM: &[&str] = &[
    "Standard_D4s_V3",
    "Standard_D4s_V5",
    "Standard_D4ds_V5",
    "Standard_D8s_V3",
    "Standard_D8s_V5",
];
const AKS_PROXY: &[&str] = &[
    "Standard_B2s_V2",
    "Standard_B4s_V2",
    "Standard_D2s_V3",
    "Standard_D2s_V5",
];
const AKS_WORKERS: &[&str] = &[
    "Standard_D8s_V3",
    "Standard_D8s_V5",
    "Standard_D16s_V5",
    "Standard_E8s_V5",
    "Standard_E16s_V5",
];

const EKS_SYSTEM: &[&str] = &["m5.xlarge", "m6i.xlarge", "m7i.xlarge"];
const EKS_PROXY: &[&str] = &["t3.medium", "t3.large", "m6i.large"];
const EKS_WORKERS: &[&str] = &["m5.2xlarge", "m6i.2xlarge", "m6i.4xlarge", "r6i.2xlarge"];

/// Allowed canonical instance types for `pool`, or `None` when the
/// environment has no allow-list (k3s) or the pool is unknown.
pub fn allowed_types(environment: EnvironmentKind, pool: &str) -> Option<&'static [&'static str]> {
    let list = match (environment, pool) {
        (EnvironmentKind::Aks, "system") => AKS_SYSTEM,
        (EnvironmentKind::Aks, "proxy") => AKS_PROXY,
        (EnvironmentKind::Aks, "workers") => AKS_WORKERS,
        (EnvironmentKind::Eks, "system") => EKS_SYSTEM,
        (EnvironmentKind::Eks, "proxy") => EKS_PROXY,
        (EnvironmentKind::Eks, "workers") => EKS_WORKERS,
        _ => return None,
    };
    Some(list)
}

/// Canonical casing of a provider machine type.
///
/// aks: `Standard_` prefix, leading family letters upper case, the rest
/// lower case, `vN` generation suffixes as `VN`. eks: lower case.
/// Normalizing a canonical string returns it unchanged.
pub fn normalize_instance_type(environment: EnvironmentKind, raw: &str) -> String {
    let raw = raw.trim();
    match environment {
        EnvironmentKind::Aks => normalize_azure(raw),
        EnvironmentKind::Eks | EnvironmentKind::K3s => raw.to_ascii_lowercase(),
    }
}

fn normalize_azure(raw: &str) -> String {
    let body = match raw.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("standard_") => &raw[9..],
        _ => raw,
    };

    let mut out = String::from("Standard");
    for (i, segment) in body.split('_').enumerate() {
        out.push('_');
        if i == 0 {
            let family_len = segment
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(segment.len());
            out.push_str(&segment[..family_len].to_ascii_uppercase());
            out.push_str(&segment[family_len..].to_ascii_lowercase());
        } else if is_generation(segment) {
            out.push('V');
            out.push_str(&segment[1..]);
        } else {
            let lower = segment.to_ascii_lowercase();
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn is_generation(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some('v' | 'V'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

/// Whether a provider pool name denotes the platform pool `pool`
/// (`workers`, `workers2`, `workers-spot`).
pub fn pool_matches(name: &str, pool: &str) -> bool {
    let name = name.to_ascii_lowercase();
    match name.strip_prefix(pool) {
        Some("") => true,
        Some(rest) => rest.starts_with('-') || rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}
