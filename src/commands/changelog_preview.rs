use serde::Serialize;
use tracing::info;

use crate::{
    analyzer,
    changelog::{self, render_fragment},
    classifier::ClassifierMode,
    cli::ChangelogPreviewArgs,
    commands::{print_output, targeting},
    errors::Result,
    types::{OutputFormat, TargetSelector},
    ReleaseApp,
};

#[derive(Debug, Serialize)]
struct PreviewEntry {
    package_name: String,
    version: String,
    fragment: String,
}

#[derive(Debug, Serialize)]
struct PreviewResult {
    entries: Vec<PreviewEntry>,
}

/// Renders changelog fragments C9 would produce, with no writes, no
/// publishing, no tagging: pure local review (§4.11).
pub fn execute(args: &ChangelogPreviewArgs, output: OutputFormat, app: &ReleaseApp) -> Result<i32> {
    let resolved = targeting::resolve_targets(&args.target, &args.changed, &app.workspace)?;

    let strategy = match args.level {
        Some(level) => targeting::forced_strategy(&resolved.names, &app.workspace, level),
        None => {
            let head_ref = args.changed.commit_sha.as_deref().unwrap_or("HEAD");
            let classified =
                analyzer::analyze(&app.workspace, &args.changed.base, head_ref, ClassifierMode::Default)?;
            if matches!(resolved.selector, TargetSelector::All) {
                classified
            } else {
                classified
                    .into_iter()
                    .filter(|(name, _)| resolved.names.contains(name))
                    .collect()
            }
        }
    };

    let epoch = changelog::now_epoch_seconds();
    let mut entries = Vec::new();

    for (name, strategy_entry) in &strategy {
        let Some(package) = app.workspace.package(name) else {
            continue;
        };

        let fragment = render_fragment(&package.version, strategy_entry, epoch);
        entries.push(PreviewEntry {
            package_name: name.clone(),
            version: package.version.to_string(),
            fragment,
        });
    }

    info!(
        command_path = "cargo-monorelease.changelog-preview",
        package_count = entries.len(),
        action = "render-preview",
        outcome = "success",
        "Rendered changelog preview"
    );

    let human = if entries.is_empty() {
        "No packages crossed a bump threshold; nothing to preview.".to_string()
    } else {
        entries
            .iter()
            .map(|entry| format!("## {} ({})\n\n{}", entry.package_name, entry.version, entry.fragment))
            .collect::<Vec<_>>()
            .join("\n")
    };

    print_output(output, &human, &PreviewResult { entries })?;
    Ok(0)
}
