use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::{
    analyzer::{self, StrategyMap},
    classifier::{ClassifierMode, DefaultConventionalPreset},
    cli::ReleaseArgs,
    commands::{print_output, targeting},
    config::{Config, GitConfig},
    errors::Result,
    orchestrator,
    plugin::{LoggingPlugin, PluginHost},
    registry::{HttpRegistryAdapter, NullRegistryAdapter, RegistryAdapter},
    types::{OutputFormat, TargetSelector},
    ReleaseApp,
};

#[derive(Debug, Serialize)]
struct ReleaseResult {
    dry_run: bool,
    released: Vec<ReleasedPackage>,
    skipped: Vec<SkippedPackage>,
    commit_sha: Option<String>,
    pushed_tags: Vec<String>,
    plugin_failures: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReleasedPackage {
    name: String,
    previous_version: String,
    new_version: String,
    tag_name: String,
}

#[derive(Debug, Serialize)]
struct SkippedPackage {
    name: String,
    reason: &'static str,
}

pub async fn execute(args: &ReleaseArgs, output: OutputFormat, app: &ReleaseApp) -> Result<i32> {
    let resolved = targeting::resolve_targets(&args.target, &args.changed, &app.workspace)?;

    let mut config = Config {
        cwd: app.workspace.root.clone(),
        dry_run: args.dry_run,
        git: GitConfig {
            base_branch: args.changed.base.clone(),
            commit_sha: args.changed.commit_sha.clone(),
            ..GitConfig::default()
        },
        ..Config::default()
    };
    config.registry_url = args.registry.clone();
    config.no_registry = config.registry_url.is_none();

    let registry: Arc<dyn RegistryAdapter> = match &config.registry_url {
        Some(url) => Arc::new(HttpRegistryAdapter::new(url.clone())?),
        None => Arc::new(NullRegistryAdapter),
    };

    let plugin_host = PluginHost::new(vec![Box::new(LoggingPlugin)]);

    let explicit = match args.level {
        Some(level) => targeting::forced_strategy(&resolved.names, &app.workspace, level),
        None => {
            let preset = DefaultConventionalPreset;
            let classifier_mode = match &args.preset {
                Some(_) => ClassifierMode::Conventional(&preset),
                None => ClassifierMode::Default,
            };
            let classified = analyzer::analyze(
                &app.workspace,
                &config.git.base_branch,
                config.git.head_ref(),
                classifier_mode,
            )?;
            narrow_to_selection(classified, &resolved.selector, &resolved.names)
        }
    };

    info!(
        command_path = "cargo-monorelease.release",
        dry_run = config.dry_run,
        candidate_count = explicit.len(),
        action = "run-release",
        outcome = "started",
        "Starting release pipeline"
    );

    let summary =
        orchestrator::run_release_with_explicit(&app.workspace, &config, registry, explicit, &plugin_host).await?;

    let released = summary
        .descriptors
        .iter()
        .map(|descriptor| ReleasedPackage {
            name: descriptor.name.clone(),
            previous_version: descriptor.previous_version.to_string(),
            new_version: descriptor.new_version.to_string(),
            tag_name: descriptor.tag_name.clone(),
        })
        .collect::<Vec<_>>();

    let skipped = summary
        .skip_reasons
        .iter()
        .map(|(name, reason)| SkippedPackage {
            name: name.clone(),
            reason: reason.as_str(),
        })
        .collect::<Vec<_>>();

    let result = ReleaseResult {
        dry_run: config.dry_run,
        commit_sha: summary.record.commit_sha.clone(),
        pushed_tags: summary.record.pushed_tags.clone(),
        plugin_failures: summary
            .plugin_failures
            .iter()
            .map(|failure| format!("{}: {}", failure.plugin_name, failure.message))
            .collect(),
        released,
        skipped,
    };

    let human = if result.released.is_empty() {
        "No packages crossed a bump threshold; nothing released.".to_string()
    } else {
        let mut lines = vec![format!("Released {} package(s):", result.released.len())];
        for package in &result.released {
            lines.push(format!(
                "- {} {} -> {} ({})",
                package.name, package.previous_version, package.new_version, package.tag_name
            ));
        }
        if result.dry_run {
            lines.push("(dry run: nothing was uploaded, committed, or pushed)".to_string());
        }
        lines.join("\n")
    };

    print_output(output, &human, &result)?;
    Ok(0)
}

/// Restricts an auto-classified strategy map to the resolved target
/// selection. `All` leaves the map untouched: the classifier's own file-diff
/// scoping already decided which packages are in play.
fn narrow_to_selection(
    classified: StrategyMap,
    selector: &TargetSelector,
    names: &std::collections::BTreeSet<String>,
) -> StrategyMap {
    if matches!(selector, TargetSelector::All) {
        return classified;
    }

    classified
        .into_iter()
        .filter(|(name, _)| names.contains(name))
        .collect()
}
