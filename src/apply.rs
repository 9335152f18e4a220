use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use semver::Version;
use tracing::info;

use crate::{
    analyzer::StrategyMap,
    config::Config,
    errors::{ReleaseError, Result},
    manifest, registry::RegistryAdapter,
    versioning,
    workspace::Workspace,
};

/// Active dist-tag for registry lookups and uploads (§4.4: prerelease mode
/// reads/writes under its own dist-tag rather than `latest`).
pub fn active_dist_tag(config: &Config) -> &str {
    if config.prerelease {
        config.prerelease_tag.as_deref().unwrap_or("next")
    } else {
        "latest"
    }
}

/// Queries C2 for every package in `strategy`, under `dist_tag`. Missing
/// entries are left out of the map; callers default a miss to `0.0.0` (§3).
pub fn fetch_registry_versions(
    registry: &dyn RegistryAdapter,
    strategy: &StrategyMap,
    dist_tag: &str,
) -> Result<BTreeMap<String, Version>> {
    let mut versions = BTreeMap::new();

    for name in strategy.keys() {
        if let Some(version) = registry.fetch_dist_tag(name, dist_tag)? {
            versions.insert(name.clone(), version);
        }
    }

    Ok(versions)
}

/// Version applier (C7): computed previous/next version per package in the
/// strategy map.
#[derive(Debug, Clone, Default)]
pub struct AppliedVersions {
    pub previous: BTreeMap<String, Version>,
    pub next: BTreeMap<String, Version>,
}

/// Computes next versions from the registry tag map and strategy map (§4.4).
/// A package with no prior publication defaults to `0.0.0` (§3).
pub fn apply(
    strategy: &StrategyMap,
    registry_versions: &BTreeMap<String, Version>,
    config: &Config,
) -> Result<AppliedVersions> {
    let preid = config.prerelease.then_some(active_dist_tag(config));
    let mut applied = AppliedVersions::default();

    for (name, strategy_entry) in strategy {
        let current = registry_versions
            .get(name)
            .cloned()
            .unwrap_or_else(|| Version::new(0, 0, 0));
        let next = versioning::bump_version(&current, strategy_entry.bump_level, preid)?;

        info!(
            command_path = "apply.compute-version",
            package_name = %name,
            previous_version = %current,
            new_version = %next,
            bump_level = strategy_entry.bump_level.as_str(),
            action = "compute-version",
            outcome = "success",
            "Computed next version"
        );

        applied.previous.insert(name.clone(), current);
        applied.next.insert(name.clone(), next);
    }

    Ok(applied)
}

/// Every manifest path APPLY might touch: each strategy package's own
/// manifest plus every workspace-internal consumer's manifest (since a
/// consumer's declared range may be rewritten). Used to size the C8 backup
/// before any write happens.
pub fn affected_manifest_paths(workspace: &Workspace, strategy: &StrategyMap) -> BTreeSet<PathBuf> {
    let mut paths = BTreeSet::new();

    for name in strategy.keys() {
        if let Some(package) = workspace.package(name) {
            paths.insert(package.manifest_path.clone());
        }

        for (consumer, _edge) in workspace.consumers_of(name) {
            paths.insert(consumer.manifest_path.clone());
        }
    }

    paths
}

/// Writes every computed version to disk: each package's own `[package]
/// version`, then every consumer's declared range on a bumped provider
/// (§4.4). Returns the manifest paths actually touched, for staging by C11.
pub fn write_versions(workspace: &Workspace, applied: &AppliedVersions) -> Result<BTreeSet<PathBuf>> {
    let mut touched = BTreeSet::new();

    for (name, version) in &applied.next {
        let package = workspace.package(name).ok_or_else(|| {
            ReleaseError::workspace(format!("strategy references unknown package `{name}`"))
        })?;

        manifest::bump_package_version(package, version)?;
        touched.insert(package.manifest_path.clone());

        info!(
            command_path = "apply.write-version",
            package_name = %name,
            new_version = %version,
            action = "write-manifest",
            outcome = "success",
            "Wrote package version to manifest"
        );
    }

    for (name, version) in &applied.next {
        let rewritten = manifest::rewrite_dependents(workspace, name, version)?;
        touched.extend(rewritten);
    }

    Ok(touched)
}
