use std::{collections::BTreeMap, sync::Arc};

use semver::Version;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::info;

use crate::{
    analyzer::StrategyMap,
    config::Config,
    errors::{ErrorKind, ReleaseError, Result},
    manifest, packer,
    registry::RegistryAdapter,
    types::{Access, PublishSkipReason},
    workspace::{Package, Workspace},
};

/// Outcome of driving PUBLISH (C10) across every package in the strategy map.
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub skip_reasons: BTreeMap<String, PublishSkipReason>,
}

/// Publish scheduler (C10): drives `prepublish-hook -> pack -> upload ->
/// postpublish-hook` for every package in `strategy`, honoring `jobs` and
/// `maxConcurrentWrites` concurrency bounds, `topological` grouping, dry-run,
/// and the registry-skip configuration (§4.7).
///
/// Per-package failures do not drop already-succeeded packages: every
/// spawned task runs to completion (or failure) before this function
/// aggregates and returns a single error.
pub async fn publish(
    workspace: &Workspace,
    config: &Config,
    registry: Arc<dyn RegistryAdapter>,
    strategy: &StrategyMap,
    next_versions: &BTreeMap<String, Version>,
) -> Result<PublishOutcome> {
    let selected = strategy.keys().cloned().collect::<std::collections::BTreeSet<_>>();

    let groups = if config.topological {
        workspace.topological_levels(&selected, config.topological_dev)?
    } else {
        vec![selected.into_iter().collect::<Vec<_>>()]
    };

    let jobs_semaphore = Arc::new(Semaphore::new(config.effective_jobs()));
    let writes_semaphore = Arc::new(Semaphore::new(config.max_concurrent_writes));
    let next_versions = Arc::new(next_versions.clone());

    let mut outcome = PublishOutcome::default();
    let mut failures = Vec::new();

    for group in groups {
        if !failures.is_empty() {
            // §4.7: "a group starts only after all packages in the prior
            // group complete" gates on success, not just completion. A
            // dependent must never be packed/uploaded once the provider
            // it points at failed to publish.
            for name in group {
                info!(
                    command_path = "scheduler.publish",
                    package_name = %name,
                    action = "publish",
                    outcome = "skipped",
                    reason = "earlier-group-failed",
                    "Skipping package after an earlier topological group failed"
                );
                outcome
                    .skip_reasons
                    .insert(name, PublishSkipReason::EarlierGroupFailed);
            }
            continue;
        }

        let mut tasks = JoinSet::new();

        for name in group {
            let Some(package) = workspace.package(&name).cloned() else {
                continue;
            };

            let jobs_semaphore = jobs_semaphore.clone();
            let writes_semaphore = writes_semaphore.clone();
            let next_versions = next_versions.clone();
            let registry = registry.clone();
            let config = config.clone();

            tasks.spawn(async move {
                let _permit = jobs_semaphore
                    .acquire_owned()
                    .await
                    .expect("jobs semaphore is never closed");

                publish_one(&package, &config, registry, &next_versions, writes_semaphore).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|error| {
                ReleaseError::new(ErrorKind::Publish, format!("Publish task panicked: {error}"))
            })?;

            match result {
                Ok((name, reason)) => {
                    if let Some(reason) = reason {
                        outcome.skip_reasons.insert(name, reason);
                    }
                }
                Err(error) => failures.push(error),
            }
        }
    }

    if !failures.is_empty() {
        let message = failures
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        return Err(ReleaseError::new(
            ErrorKind::Publish,
            format!("{} package(s) failed to publish: {message}", failures.len()),
        ));
    }

    Ok(outcome)
}

async fn publish_one(
    package: &Package,
    config: &Config,
    registry: Arc<dyn RegistryAdapter>,
    next_versions: &BTreeMap<String, Version>,
    writes_semaphore: Arc<Semaphore>,
) -> Result<(String, Option<PublishSkipReason>)> {
    let name = package.name.clone();

    info!(
        command_path = "scheduler.prepublish-hook",
        package_name = %name,
        action = "prepublish-hook",
        outcome = "success",
        "Running prepublish hook"
    );

    if package.private {
        info!(
            command_path = "scheduler.publish",
            package_name = %name,
            action = "publish",
            outcome = "skipped",
            reason = PublishSkipReason::NonPublishable.as_str(),
            "Skipping pack/upload for a private package"
        );
        return Ok((name, Some(PublishSkipReason::NonPublishable)));
    }

    if config.no_registry || config.registry_url.is_none() {
        info!(
            command_path = "scheduler.publish",
            package_name = %name,
            action = "publish",
            outcome = "skipped",
            reason = PublishSkipReason::RegistrySkipped.as_str(),
            "Skipping pack/upload; no registry configured"
        );
        return Ok((name, Some(PublishSkipReason::RegistrySkipped)));
    }

    let package_for_render = package.clone();
    let versions_for_render = next_versions.clone();
    let rendered_manifest = tokio::task::spawn_blocking(move || {
        manifest::render_archive_manifest(&package_for_render, &versions_for_render)
    })
    .await
    .map_err(|error| ReleaseError::for_package(ErrorKind::Publish, name.clone(), format!("pack task panicked: {error}")))??;

    let package_for_pack = package.clone();
    let manifest_for_pack = rendered_manifest.clone();
    let archive = tokio::task::spawn_blocking(move || packer::pack_archive(&package_for_pack, &manifest_for_pack))
        .await
        .map_err(|error| ReleaseError::for_package(ErrorKind::Publish, name.clone(), format!("pack task panicked: {error}")))??;

    info!(
        command_path = "scheduler.pack",
        package_name = %name,
        archive_bytes = archive.len(),
        action = "pack",
        outcome = "success",
        "Packed archive"
    );

    if config.dry_run {
        info!(
            command_path = "scheduler.publish",
            package_name = %name,
            action = "publish",
            outcome = "skipped",
            reason = PublishSkipReason::DryRun.as_str(),
            "Dry run: not uploading archive"
        );
        return Ok((name, Some(PublishSkipReason::DryRun)));
    }

    let _write_permit = writes_semaphore
        .acquire_owned()
        .await
        .expect("writes semaphore is never closed");

    let dist_tag = crate::apply::active_dist_tag(config).to_string();
    let access = config.access;
    let upload_name = name.clone();
    let upload_registry = registry.clone();

    tokio::task::spawn_blocking(move || {
        upload_registry.publish(&upload_name, &dist_tag, archive, rendered_manifest, access)
    })
    .await
    .map_err(|error| ReleaseError::for_package(ErrorKind::Publish, name.clone(), format!("upload task panicked: {error}")))??;

    info!(
        command_path = "scheduler.postpublish-hook",
        package_name = %name,
        action = "postpublish-hook",
        outcome = "success",
        "Running postpublish hook"
    );

    Ok((name, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyzer::VersionStrategy,
        types::{BumpLevel, DependencyKind, StrategyOrigin},
        workspace::DependencyEdge,
    };
    use std::{collections::BTreeSet, path::PathBuf, sync::Mutex};

    struct RecordingRegistry {
        published: Mutex<Vec<String>>,
        fail: BTreeSet<String>,
    }

    impl RegistryAdapter for RecordingRegistry {
        fn fetch_dist_tag(&self, _package_name: &str, _dist_tag: &str) -> Result<Option<Version>> {
            Ok(None)
        }

        fn publish(
            &self,
            package_name: &str,
            _dist_tag: &str,
            _archive: Vec<u8>,
            _manifest: String,
            _access: Access,
        ) -> Result<()> {
            if self.fail.contains(package_name) {
                return Err(ReleaseError::for_package(ErrorKind::Publish, package_name, "boom"));
            }
            self.published.lock().unwrap().push(package_name.to_string());
            Ok(())
        }
    }

    fn package_fixture(dir: &std::path::Path, name: &str) -> Package {
        let package_dir = dir.join(name);
        std::fs::create_dir_all(&package_dir).unwrap();
        let manifest_path = package_dir.join("Cargo.toml");
        std::fs::write(
            &manifest_path,
            format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )
        .unwrap();

        Package {
            name: name.to_string(),
            version: Version::new(0, 1, 0),
            manifest_relative_path: PathBuf::from(format!("{name}/Cargo.toml")),
            manifest_path,
            directory_relative_path: PathBuf::from(name),
            directory: package_dir,
            private: false,
            dependencies: vec![],
        }
    }

    fn strategy_entry() -> VersionStrategy {
        VersionStrategy {
            bump_level: BumpLevel::Patch,
            driving_commits: vec![],
            origin: StrategyOrigin::Explicit,
        }
    }

    #[tokio::test]
    async fn private_packages_are_skipped_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let mut package = package_fixture(dir.path(), "pkg-1");
        package.private = true;
        let workspace = Workspace::from_packages_for_test(vec![package]);

        let mut strategy = StrategyMap::new();
        strategy.insert("pkg-1".to_string(), strategy_entry());

        let mut next_versions = BTreeMap::new();
        next_versions.insert("pkg-1".to_string(), Version::new(0, 1, 1));

        let registry = Arc::new(RecordingRegistry {
            published: Mutex::new(vec![]),
            fail: BTreeSet::new(),
        });

        let mut config = Config::default();
        config.registry_url = Some("https://example.invalid".to_string());

        let outcome = publish(&workspace, &config, registry.clone(), &strategy, &next_versions)
            .await
            .unwrap();

        assert_eq!(
            outcome.skip_reasons.get("pkg-1"),
            Some(&PublishSkipReason::NonPublishable)
        );
        assert!(registry.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_registry_url_skips_pack_and_upload() {
        let dir = tempfile::tempdir().unwrap();
        let package = package_fixture(dir.path(), "pkg-1");
        let workspace = Workspace::from_packages_for_test(vec![package]);

        let mut strategy = StrategyMap::new();
        strategy.insert("pkg-1".to_string(), strategy_entry());
        let mut next_versions = BTreeMap::new();
        next_versions.insert("pkg-1".to_string(), Version::new(0, 1, 1));

        let registry = Arc::new(RecordingRegistry {
            published: Mutex::new(vec![]),
            fail: BTreeSet::new(),
        });

        let config = Config::default();
        let outcome = publish(&workspace, &config, registry.clone(), &strategy, &next_versions)
            .await
            .unwrap();

        assert_eq!(
            outcome.skip_reasons.get("pkg-1"),
            Some(&PublishSkipReason::RegistrySkipped)
        );
    }

    #[tokio::test]
    async fn dry_run_packs_but_does_not_upload() {
        let dir = tempfile::tempdir().unwrap();
        let package = package_fixture(dir.path(), "pkg-1");
        let workspace = Workspace::from_packages_for_test(vec![package]);

        let mut strategy = StrategyMap::new();
        strategy.insert("pkg-1".to_string(), strategy_entry());
        let mut next_versions = BTreeMap::new();
        next_versions.insert("pkg-1".to_string(), Version::new(0, 1, 1));

        let registry = Arc::new(RecordingRegistry {
            published: Mutex::new(vec![]),
            fail: BTreeSet::new(),
        });

        let mut config = Config::default();
        config.registry_url = Some("https://example.invalid".to_string());
        config.dry_run = true;

        let outcome = publish(&workspace, &config, registry.clone(), &strategy, &next_versions)
            .await
            .unwrap();

        assert_eq!(outcome.skip_reasons.get("pkg-1"), Some(&PublishSkipReason::DryRun));
        assert!(registry.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_failing_package_does_not_drop_a_succeeding_one() {
        let dir = tempfile::tempdir().unwrap();
        let pkg1 = package_fixture(dir.path(), "pkg-1");
        let pkg2 = package_fixture(dir.path(), "pkg-2");
        let workspace = Workspace::from_packages_for_test(vec![pkg1, pkg2]);

        let mut strategy = StrategyMap::new();
        strategy.insert("pkg-1".to_string(), strategy_entry());
        strategy.insert("pkg-2".to_string(), strategy_entry());

        let mut next_versions = BTreeMap::new();
        next_versions.insert("pkg-1".to_string(), Version::new(0, 1, 1));
        next_versions.insert("pkg-2".to_string(), Version::new(0, 1, 1));

        let registry = Arc::new(RecordingRegistry {
            published: Mutex::new(vec![]),
            fail: BTreeSet::from(["pkg-1".to_string()]),
        });

        let mut config = Config::default();
        config.registry_url = Some("https://example.invalid".to_string());

        let result = publish(&workspace, &config, registry.clone(), &strategy, &next_versions).await;

        assert!(result.is_err());
        assert_eq!(registry.published.lock().unwrap().as_slice(), ["pkg-2".to_string()]);
    }

    #[tokio::test]
    async fn topological_mode_skips_later_groups_after_an_earlier_group_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pkg1 = package_fixture(dir.path(), "pkg-1");
        let mut pkg2 = package_fixture(dir.path(), "pkg-2");
        pkg2.dependencies = vec![DependencyEdge {
            name: "pkg-1".to_string(),
            kind: DependencyKind::Runtime,
            is_workspace_path: true,
        }];
        let workspace = Workspace::from_packages_for_test(vec![pkg1, pkg2]);

        let mut strategy = StrategyMap::new();
        strategy.insert("pkg-1".to_string(), strategy_entry());
        strategy.insert("pkg-2".to_string(), strategy_entry());

        let mut next_versions = BTreeMap::new();
        next_versions.insert("pkg-1".to_string(), Version::new(0, 1, 1));
        next_versions.insert("pkg-2".to_string(), Version::new(0, 1, 1));

        let registry = Arc::new(RecordingRegistry {
            published: Mutex::new(vec![]),
            fail: BTreeSet::from(["pkg-1".to_string()]),
        });

        let mut config = Config::default();
        config.registry_url = Some("https://example.invalid".to_string());
        config.topological = true;

        let result = publish(&workspace, &config, registry.clone(), &strategy, &next_versions).await;

        assert!(result.is_err());
        assert!(registry.published.lock().unwrap().is_empty());
    }
}
