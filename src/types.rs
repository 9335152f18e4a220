use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

/// Total order `none < patch < minor < major`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BumpLevel {
    None,
    Patch,
    Minor,
    Major,
}

impl BumpLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }

    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }
}

/// Dependency kind, keyed by Cargo manifest table (plus the Non-Cargo `peer`
/// kind kept for data-model completeness per the propagator's contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    Runtime,
    Development,
    Build,
    Peer,
    Optional,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Development => "development",
            Self::Build => "build",
            Self::Peer => "peer",
            Self::Optional => "optional",
        }
    }

    /// Whether this kind's edges propagate bumps along the reverse graph (C6).
    pub fn propagates(self) -> bool {
        !matches!(self, Self::Optional)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyOrigin {
    Explicit,
    Propagated,
}

impl StrategyOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Propagated => "propagated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetSelector {
    All,
    Changed,
    Package,
}

impl TargetSelector {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Changed => "changed",
            Self::Package => "package",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishSkipReason {
    NonPublishable,
    AlreadyPublished,
    RegistrySkipped,
    DryRun,
    EarlierGroupFailed,
}

impl PublishSkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonPublishable => "non-publishable",
            Self::AlreadyPublished => "already-published",
            Self::RegistrySkipped => "registry-skipped",
            Self::DryRun => "dry-run",
            Self::EarlierGroupFailed => "earlier-group-failed",
        }
    }
}

/// `public` | `restricted` registry access level (§6 configuration option `access`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    #[default]
    Public,
    Restricted,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
        }
    }
}
