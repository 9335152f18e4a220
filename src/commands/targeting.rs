use std::collections::BTreeSet;

use crate::{
    analyzer::{StrategyMap, VersionStrategy},
    cli::{ChangedArgs, TargetArgs},
    errors::{ReleaseError, Result},
    git,
    types::{BumpLevel, StrategyOrigin, TargetSelector},
    workspace::Workspace,
};

#[derive(Debug, Clone)]
pub struct ResolvedTargets {
    pub selector: TargetSelector,
    pub names: BTreeSet<String>,
    pub base_ref: Option<String>,
    pub merge_base: Option<String>,
}

/// Resolves `--all` / `--changed` / `--package` into a concrete package set,
/// mirroring the bump/publish command's own target resolution.
pub fn resolve_targets(
    target: &TargetArgs,
    changed: &ChangedArgs,
    workspace: &Workspace,
) -> Result<ResolvedTargets> {
    if target.changed {
        let head_ref = changed.commit_sha.as_deref().unwrap_or("HEAD");
        let changed_files = git::changed_files(&changed.base, head_ref, changed.include_uncommitted)?;
        let names = workspace.changed_packages(&changed_files.paths, !changed.direct_only);

        return Ok(ResolvedTargets {
            selector: TargetSelector::Changed,
            names,
            base_ref: Some(changed.base.clone()),
            merge_base: Some(changed_files.merge_base),
        });
    }

    if !target.package.is_empty() {
        let names = target.package.iter().cloned().collect::<BTreeSet<String>>();

        let missing = names
            .iter()
            .filter(|name| workspace.package(name).is_none())
            .cloned()
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(ReleaseError::configuration(format!(
                "Unknown package(s): {}",
                missing.join(", ")
            )));
        }

        return Ok(ResolvedTargets {
            selector: TargetSelector::Package,
            names,
            base_ref: None,
            merge_base: None,
        });
    }

    Ok(ResolvedTargets {
        selector: TargetSelector::All,
        names: workspace.all_package_names(),
        base_ref: None,
        merge_base: None,
    })
}

/// Builds an explicit strategy map that forces `level` on every non-private
/// name in `names`, bypassing the commit classifier (§4.11's `--level`
/// override).
pub fn forced_strategy(names: &BTreeSet<String>, workspace: &Workspace, level: BumpLevel) -> StrategyMap {
    let mut strategy = StrategyMap::new();

    for name in names {
        let Some(package) = workspace.package(name) else {
            continue;
        };
        if package.private {
            continue;
        }

        strategy.insert(
            name.clone(),
            VersionStrategy {
                bump_level: level,
                driving_commits: Vec::new(),
                origin: StrategyOrigin::Explicit,
            },
        );
    }

    strategy
}
