use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    classifier::{classify_commits, ClassifierMode},
    errors::Result,
    git,
    types::{BumpLevel, StrategyOrigin},
    workspace::Workspace,
};

#[derive(Debug, Clone, Serialize)]
pub struct VersionStrategy {
    pub bump_level: BumpLevel,
    pub driving_commits: Vec<String>,
    pub origin: StrategyOrigin,
}

pub type StrategyMap = BTreeMap<String, VersionStrategy>;

/// Change analyzer (C5): combines the commit log and file diff between
/// `base_ref` and `head_ref` into an explicit per-package strategy map.
/// `head_ref` is `git.commitSha` (§6) when the caller pinned one, or `"HEAD"`
/// otherwise — see [`crate::config::GitConfig::head_ref`].
pub fn analyze(
    workspace: &Workspace,
    base_ref: &str,
    head_ref: &str,
    mode: ClassifierMode<'_>,
) -> Result<StrategyMap> {
    let commit_messages = git::log_messages(base_ref, head_ref)?;
    let root_level = classify_commits(&commit_messages, mode);

    if root_level == BumpLevel::None {
        return Ok(StrategyMap::new());
    }

    let changed = git::changed_files(base_ref, head_ref, false)?;
    // direct matches only: dependency-closure expansion is the propagator's (C6) job.
    let affected = workspace.changed_packages(&changed.paths, false);

    let mut strategies = StrategyMap::new();
    for name in affected {
        let Some(package) = workspace.package(&name) else {
            continue;
        };

        if package.private {
            continue;
        }

        strategies.insert(
            name,
            VersionStrategy {
                bump_level: root_level,
                driving_commits: commit_messages.clone(),
                origin: StrategyOrigin::Explicit,
            },
        );
    }

    Ok(strategies)
}
