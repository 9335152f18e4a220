use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::{error, info};

use crate::{
    analyzer::{self, StrategyMap},
    apply::{self, AppliedVersions},
    backup::ManifestBackup,
    changelog,
    classifier::ClassifierMode,
    config::Config,
    errors::Result,
    plugin::{PluginFailure, PluginHost},
    recorder::{self, RecordOutcome, ReleaseDescriptor},
    registry::RegistryAdapter,
    scheduler,
    types::PublishSkipReason,
    workspace::Workspace,
};

/// What a full `INIT -> ... -> DONE` pipeline run (C13) produced.
#[derive(Debug, Clone, Default)]
pub struct ReleaseSummary {
    pub applied: AppliedVersions,
    pub descriptors: Vec<ReleaseDescriptor>,
    pub record: RecordOutcome,
    pub skip_reasons: BTreeMap<String, PublishSkipReason>,
    pub plugin_failures: Vec<PluginFailure>,
}

/// Orchestrator (C13): the top-level state machine composing C1-C12 with
/// the failure/rollback protocol (§4.10).
///
/// ```text
/// INIT -> ANALYZE -> PROPAGATE -> APPLY -> PUBLISH -> RECORD -> NOTIFY -> DONE
///              \          \          \         \         \
///           ABORT_CLEAN  ABORT_CLEAN ABORT_RESTORE      ABORT_POSTPUBLISH
/// ```
///
/// ANALYZE/PROPAGATE failures propagate directly: nothing has been mutated
/// yet (ABORT_CLEAN). An APPLY or PUBLISH failure restores the manifest
/// backup taken right after APPLY computes its versions (ABORT_RESTORE). A
/// RECORD failure after tags may already have been created restores the
/// manifests locally but does not attempt to unwind already-uploaded
/// archives (ABORT_POSTPUBLISH) — the release is "published, unrecorded".
pub async fn run_release(
    workspace: &Workspace,
    config: &Config,
    registry: Arc<dyn RegistryAdapter>,
    classifier_mode: ClassifierMode<'_>,
    plugin_host: &PluginHost,
) -> Result<ReleaseSummary> {
    // ANALYZE
    let explicit = analyzer::analyze(workspace, &config.git.base_branch, config.git.head_ref(), classifier_mode)?;
    run_release_with_explicit(workspace, config, registry, explicit, plugin_host).await
}

/// Same pipeline as [`run_release`], but with ANALYZE (C5) already decided by
/// the caller — used by the CLI's `--level` override (§4.11), which forces an
/// explicit bump level on a resolved target set instead of classifying commit
/// messages.
pub async fn run_release_with_explicit(
    workspace: &Workspace,
    config: &Config,
    registry: Arc<dyn RegistryAdapter>,
    explicit: StrategyMap,
    plugin_host: &PluginHost,
) -> Result<ReleaseSummary> {
    if explicit.is_empty() {
        info!(
            command_path = "orchestrator.run-release",
            action = "analyze",
            outcome = "empty",
            "No package crossed a bump threshold; nothing to release"
        );
        return Ok(ReleaseSummary::default());
    }

    // PROPAGATE
    let strategy = propagate_and_validate(workspace, &explicit)?;

    // APPLY
    let dist_tag = apply::active_dist_tag(config).to_string();
    let registry_versions = apply::fetch_registry_versions(registry.as_ref(), &strategy, &dist_tag)?;
    let applied = apply::apply(&strategy, &registry_versions, config)?;

    let affected_paths = apply::affected_manifest_paths(workspace, &strategy);
    let mut backup = Some(ManifestBackup::snapshot(&affected_paths)?);

    let staged = match write_versions_and_changelog(workspace, config, &strategy, &applied) {
        Ok(staged) => staged,
        Err(error) => {
            restore_or_warn(backup.take());
            return Err(error);
        }
    };

    // PUBLISH
    let publish_outcome =
        match scheduler::publish(workspace, config, registry.clone(), &strategy, &applied.next).await {
            Ok(outcome) => outcome,
            Err(error) => {
                restore_or_warn(backup.take());
                return Err(error);
            }
        };

    // §4.5: persistVersions=false restores manifests on success too, once
    // there is nothing left that could still fail and need the backup.
    let mut staged_paths = staged.changelog_paths;
    if config.persist_versions {
        staged_paths.extend(staged.manifest_paths);
    } else {
        restore_or_warn(backup.take());
    }

    let released_names = strategy
        .keys()
        .filter(|name| workspace.package(name).is_some_and(|package| !package.private))
        .cloned();
    let descriptors = recorder::build_descriptors(
        released_names,
        &applied.previous,
        &applied.next,
        &staged.fragments,
    );

    // RECORD
    let record_outcome = match recorder::record(config, &descriptors, &staged_paths) {
        Ok(outcome) => {
            if let Some(backup) = backup.take() {
                backup.discard();
            }
            outcome
        }
        Err(error) => {
            restore_or_warn(backup.take());
            return Err(error);
        }
    };

    // NOTIFY (non-fatal per §4.9)
    let plugin_failures = plugin_host.notify_release_available(&descriptors).await;

    info!(
        command_path = "orchestrator.run-release",
        action = "run-release",
        outcome = "success",
        package_count = descriptors.len(),
        pushed_tag_count = record_outcome.pushed_tags.len(),
        "Release pipeline completed"
    );

    Ok(ReleaseSummary {
        applied,
        descriptors,
        record: record_outcome,
        skip_reasons: publish_outcome.skip_reasons,
        plugin_failures,
    })
}

/// PROPAGATE (C6) plus the cycle-rejection check that turns an otherwise
/// silent graph cycle into an explicit `WorkspaceError` (§9 "Cycle policy").
fn propagate_and_validate(workspace: &Workspace, explicit: &StrategyMap) -> Result<StrategyMap> {
    let strategy = crate::propagator::propagate(workspace, explicit)?;
    let selected = strategy.keys().cloned().collect::<BTreeSet<_>>();
    workspace.topological_order(&selected)?;
    Ok(strategy)
}

struct StagedWrites {
    manifest_paths: BTreeSet<std::path::PathBuf>,
    changelog_paths: BTreeSet<std::path::PathBuf>,
    fragments: BTreeMap<String, String>,
}

/// APPLY's on-disk manifest writes, followed immediately by CHANGELOG (C9)
/// rendering per §2's data flow (`C7 -> (C8 snapshot) -> C9 -> C10`).
fn write_versions_and_changelog(
    workspace: &Workspace,
    config: &Config,
    strategy: &StrategyMap,
    applied: &AppliedVersions,
) -> Result<StagedWrites> {
    let manifest_paths = apply::write_versions(workspace, applied)?;

    let mut changelog_paths = BTreeSet::new();
    let mut fragments = BTreeMap::new();
    let epoch = changelog::now_epoch_seconds();

    for (name, strategy_entry) in strategy {
        let Some(package) = workspace.package(name) else {
            continue;
        };
        if package.private {
            continue;
        }

        let version = applied
            .next
            .get(name)
            .expect("every strategy entry has a computed next version");
        let fragment = changelog::render_fragment(version, strategy_entry, epoch);
        let changelog_path = package.directory.join(&config.changelog_filename);

        changelog::write_changelog_fragment(&changelog_path, &fragment)?;
        changelog_paths.insert(changelog_path);
        fragments.insert(name.clone(), fragment);
    }

    Ok(StagedWrites {
        manifest_paths,
        changelog_paths,
        fragments,
    })
}

fn restore_or_warn(backup: Option<ManifestBackup>) {
    let Some(backup) = backup else {
        return;
    };

    if let Err(error) = backup.restore() {
        error!(
            command_path = "orchestrator.restore-manifests",
            action = "restore",
            outcome = "failed",
            %error,
            "Failed to restore manifest backup; on-disk manifests may be left in a bumped state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyzer::VersionStrategy,
        types::{BumpLevel, StrategyOrigin},
        workspace::{DependencyEdge, Package},
    };
    use semver::Version;
    use std::path::PathBuf;

    fn package(name: &str, dependencies: Vec<DependencyEdge>) -> Package {
        let directory_relative_path = PathBuf::from(format!("crates/{name}"));
        Package {
            name: name.to_string(),
            version: Version::new(0, 0, 1),
            manifest_path: directory_relative_path.join("Cargo.toml"),
            manifest_relative_path: directory_relative_path.join("Cargo.toml"),
            directory: directory_relative_path.clone(),
            directory_relative_path,
            private: false,
            dependencies,
        }
    }

    fn edge(name: &str) -> DependencyEdge {
        DependencyEdge {
            name: name.to_string(),
            kind: crate::types::DependencyKind::Runtime,
            is_workspace_path: true,
        }
    }

    #[test]
    fn propagate_and_validate_rejects_a_cycle() {
        let a = package("a", vec![edge("b")]);
        let b = package("b", vec![edge("a")]);
        let workspace = Workspace::from_packages_for_test(vec![a, b]);

        let mut explicit = StrategyMap::new();
        explicit.insert(
            "a".to_string(),
            VersionStrategy {
                bump_level: BumpLevel::Patch,
                driving_commits: vec![],
                origin: StrategyOrigin::Explicit,
            },
        );

        let result = propagate_and_validate(&workspace, &explicit);
        assert!(result.is_err());
    }

    #[test]
    fn propagate_and_validate_expands_dependents() {
        let pkg2 = package("pkg-2", vec![]);
        let pkg3 = package("pkg-3", vec![edge("pkg-2")]);
        let workspace = Workspace::from_packages_for_test(vec![pkg2, pkg3]);

        let mut explicit = StrategyMap::new();
        explicit.insert(
            "pkg-2".to_string(),
            VersionStrategy {
                bump_level: BumpLevel::Major,
                driving_commits: vec!["feat!: x".to_string()],
                origin: StrategyOrigin::Explicit,
            },
        );

        let strategy = propagate_and_validate(&workspace, &explicit).unwrap();
        assert_eq!(strategy["pkg-3"].bump_level, BumpLevel::Patch);
    }
}
