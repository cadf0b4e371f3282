//! Minimum CLI tool versions and version comparison.

use crate::context::EnvironmentKind;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Precision used when comparing against a minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Only major.minor is significant
    MajorMinor,
    /// major.minor.patch
    Full,
}

/// A dotted numeric version. Missing components read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid"))
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version { major, minor, patch }
    }

    /// First `X.Y[.Z]` found in free text (`v1.30.2+k3s1`,
    /// `aws-cli/2.15.0 Python/3.11`).
    pub fn find(text: &str) -> Option<Version> {
        let caps = version_regex().captures(text)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        Some(Version {
            major: num(1)?,
            minor: num(2)?,
            patch: num(3).unwrap_or(0),
        })
    }

    /// Compare at the given granularity
    pub fn compare(&self, other: &Version, granularity: Granularity) -> Ordering {
        match granularity {
            Granularity::MajorMinor => (self.major, self.minor).cmp(&(other.major, other.minor)),
            Granularity::Full => self.cmp(other),
        }
    }

    pub fn meets(&self, minimum: &Version, granularity: Granularity) -> bool {
        self.compare(minimum, granularity) != Ordering::Less
    }

    /// Absolute minor distance between two versions of the same major
    pub fn minor_skew(&self, other: &Version) -> Option<u32> {
        (self.major == other.major).then(|| self.minor.abs_diff(other.minor))
    }

    pub fn display(&self, granularity: Granularity) -> String {
        match granularity {
            Granularity::MajorMinor => format!("{}.{}", self.major, self.minor),
            Granularity::Full => self.to_string(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// CLI tool the platform tooling depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Kubectl,
    Helm,
    Az,
    Aws,
}

impl Tool {
    pub fn program(self) -> &'static str {
        match self {
            Tool::Kubectl => "kubectl",
            Tool::Helm => "helm",
            Tool::Az => "az",
            Tool::Aws => "aws",
        }
    }
}

/// Minimum version of one tool
#[derive(Debug, Clone, Copy)]
pub struct ToolRequirement {
    pub tool: Tool,
    pub minimum: Version,
    pub granularity: Granularity,
    /// Environments the tool is required in
    pub environments: &'static [EnvironmentKind],
}

const ALL_ENVS: &[EnvironmentKind] = &EnvironmentKind::ALL;

pub const TOOL_REQUIREMENTS: &[ToolRequirement] = &[
    ToolRequirement {
        tool: Tool::Kubectl,
        minimum: Version::new(1, 29, 0),
        granularity: Granularity::MajorMinor,
        environments: ALL_ENVS,
    },
    ToolRequirement {
        tool: Tool::Helm,
        minimum: Version::new(3, 12, 0),
        granularity: Granularity::Full,
        environments: ALL_ENVS,
    },
    ToolRequirement {
        tool: Tool::Az,
        minimum: Version::new(2, 50, 0),
        granularity: Granularity::Full,
        environments: &[EnvironmentKind::Aks],
    },
    ToolRequirement {
        tool: Tool::Aws,
        minimum: Version::new(2, 13, 0),
        granularity: Granularity::Full,
        environments: &[EnvironmentKind::Eks],
    },
];

/// Largest supported kubectl client/server minor skew
pub const MAX_KUBECTL_SKEW: u32 = 1;

/// Requirements relevant to `environment`, in declared order
pub fn requirements_for(environment: EnvironmentKind) -> impl Iterator<Item = &'static ToolRequirement> {
    TOOL_REQUIREMENTS
        .iter()
        .filter(move |r| r.environments.contains(&environment))
}
