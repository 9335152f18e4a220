use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use semver::Version;
use serde::Serialize;
use tracing::{info, warn};

use crate::{config::Config, errors::Result, git};

/// One released package, per the data model (§3):
/// `tag_name = "{name}@{new_version}"`.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDescriptor {
    pub name: String,
    pub previous_version: Version,
    pub new_version: Version,
    pub changelog_fragment: String,
    pub tag_name: String,
}

impl ReleaseDescriptor {
    pub fn new(
        name: impl Into<String>,
        previous_version: Version,
        new_version: Version,
        changelog_fragment: String,
    ) -> Self {
        let name = name.into();
        let tag_name = format!("{name}@{new_version}");
        Self {
            name,
            previous_version,
            new_version,
            changelog_fragment,
            tag_name,
        }
    }
}

/// What RECORD actually did, handed back to the orchestrator so NOTIFY can
/// run and the CLI can print a summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordOutcome {
    pub commit_sha: Option<String>,
    pub pushed_tags: Vec<String>,
}

/// Release recorder (C11). Stages the touched manifests/changelogs, commits
/// them, creates one annotated tag per released (non-private) package, and
/// pushes commit + tags atomically. Dry-run is a no-op that still logs the
/// tags that would have been pushed (§4.8, I5).
///
/// Tag creation order follows `descriptors`, which callers sort
/// lexicographically by package name for reproducibility (§5).
pub fn record(
    config: &Config,
    descriptors: &[ReleaseDescriptor],
    staged_paths: &BTreeSet<PathBuf>,
) -> Result<RecordOutcome> {
    if config.dry_run {
        let would_push = descriptors
            .iter()
            .map(|descriptor| descriptor.tag_name.clone())
            .collect::<Vec<_>>();

        info!(
            command_path = "recorder.record",
            dry_run = true,
            tag_count = would_push.len(),
            tags = ?would_push,
            action = "record-release",
            outcome = "skipped",
            "Dry run: not committing, tagging, or pushing"
        );

        return Ok(RecordOutcome::default());
    }

    let mut outcome = RecordOutcome::default();

    if config.auto_commit && !staged_paths.is_empty() {
        let package_names = descriptors
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .collect::<Vec<_>>();
        let message = config.render_commit_message(&package_names);

        git::add_paths(staged_paths)?;
        let sha = git::commit_paths(&message, staged_paths)?;
        outcome.commit_sha = Some(sha);

        info!(
            command_path = "recorder.record",
            action = "commit",
            outcome = "success",
            package_count = package_names.len(),
            "Committed release manifests and changelog"
        );
    }

    let mut created_tags = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let message = format!("Release {}", descriptor.tag_name);
        git::create_annotated_tag(&descriptor.tag_name, &message)?;
        created_tags.push(descriptor.tag_name.clone());

        info!(
            command_path = "recorder.record",
            tag_name = %descriptor.tag_name,
            action = "create-tag",
            outcome = "success",
            "Created annotated tag"
        );
    }

    if config.git.push {
        let mut refs = created_tags.clone();
        if outcome.commit_sha.is_some() {
            refs.push("HEAD".to_string());
        }

        if !refs.is_empty() {
            git::push(&config.git.remote, &refs)?;
        }

        outcome.pushed_tags = created_tags;

        info!(
            command_path = "recorder.record",
            remote = %config.git.remote,
            tag_count = outcome.pushed_tags.len(),
            action = "push",
            outcome = "success",
            "Pushed release commit and tags"
        );
    } else {
        warn!(
            command_path = "recorder.record",
            action = "push",
            outcome = "skipped",
            "Push disabled by configuration; tags were created locally only"
        );
    }

    Ok(outcome)
}

/// Builds the release-descriptor list for every non-private strategy entry,
/// sorted lexicographically by package name (§5 ordering guarantee).
pub fn build_descriptors(
    strategy_names: impl IntoIterator<Item = String>,
    previous_versions: &BTreeMap<String, Version>,
    new_versions: &BTreeMap<String, Version>,
    changelog_fragments: &BTreeMap<String, String>,
) -> Vec<ReleaseDescriptor> {
    let mut names = strategy_names.into_iter().collect::<Vec<_>>();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let previous = previous_versions.get(&name)?.clone();
            let next = new_versions.get(&name)?.clone();
            let fragment = changelog_fragments.get(&name).cloned().unwrap_or_default();
            Some(ReleaseDescriptor::new(name, previous, next, fragment))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_tag_name_follows_the_spec_format() {
        let descriptor = ReleaseDescriptor::new(
            "pkg-1",
            Version::new(0, 1, 0),
            Version::new(0, 2, 0),
            String::new(),
        );
        assert_eq!(descriptor.tag_name, "pkg-1@0.2.0");
    }

    #[test]
    fn build_descriptors_sorts_lexicographically_by_name() {
        let mut previous = BTreeMap::new();
        previous.insert("pkg-3".to_string(), Version::new(0, 0, 1));
        previous.insert("pkg-1".to_string(), Version::new(0, 1, 0));

        let mut next = BTreeMap::new();
        next.insert("pkg-3".to_string(), Version::new(0, 0, 2));
        next.insert("pkg-1".to_string(), Version::new(0, 2, 0));

        let descriptors = build_descriptors(
            vec!["pkg-3".to_string(), "pkg-1".to_string()],
            &previous,
            &next,
            &BTreeMap::new(),
        );

        assert_eq!(descriptors[0].name, "pkg-1");
        assert_eq!(descriptors[1].name, "pkg-3");
    }

    #[test]
    fn a_name_missing_from_either_version_map_is_skipped() {
        let previous = BTreeMap::new();
        let next = BTreeMap::new();
        let descriptors = build_descriptors(
            vec!["pkg-1".to_string()],
            &previous,
            &next,
            &BTreeMap::new(),
        );
        assert!(descriptors.is_empty());
    }
}
