use regex::Regex;
use std::sync::OnceLock;

use crate::types::BumpLevel;

/// A parsed conventional-commit header, e.g. `feat(core)!: rework the API`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalCommit {
    pub commit_type: String,
    pub scope: Option<String>,
    pub breaking: bool,
    pub description: String,
    pub raw: String,
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(?P<type>[a-zA-Z]+)(?:\((?P<scope>[^)]+)\))?(?P<breaking>!)?:\s*(?P<desc>.+)$")
            .expect("static conventional-commit header pattern is valid")
    })
}

pub fn parse_conventional_commit(message: &str) -> Option<ConventionalCommit> {
    let header = message.lines().next().unwrap_or("").trim();
    let captures = header_pattern().captures(header)?;

    let breaking_footer = message.contains("BREAKING CHANGE");
    let breaking_marker = captures.name("breaking").is_some();

    Some(ConventionalCommit {
        commit_type: captures["type"].to_lowercase(),
        scope: captures.name("scope").map(|m| m.as_str().to_string()),
        breaking: breaking_marker || breaking_footer,
        description: captures["desc"].trim().to_string(),
        raw: message.to_string(),
    })
}

/// Default mode (§4.1): a plain heuristic over the raw message, independent
/// of whether it parses as a well-formed conventional-commit header.
pub fn classify_default(message: &str) -> BumpLevel {
    let header = message.lines().next().unwrap_or("");

    if message.contains("BREAKING CHANGE") || header.contains("!:") {
        return BumpLevel::Major;
    }

    match parse_conventional_commit(message) {
        Some(commit) if commit.commit_type == "feat" => BumpLevel::Minor,
        Some(commit) if commit.commit_type == "fix" || commit.commit_type == "perf" => {
            BumpLevel::Patch
        }
        _ => BumpLevel::None,
    }
}

/// The `{breaking, features, patches}` counts a conventional-commits preset
/// yields for a commit range (§4.1, conventional mode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresetCounts {
    pub breaking: u32,
    pub features: u32,
    pub patches: u32,
}

impl PresetCounts {
    pub fn bump_level(self) -> BumpLevel {
        if self.breaking > 0 {
            BumpLevel::Major
        } else if self.features > 0 {
            BumpLevel::Minor
        } else if self.patches > 0 {
            BumpLevel::Patch
        } else {
            BumpLevel::None
        }
    }
}

/// A named conventional-commits preset. The core only ever needs the
/// `{breaking, features, patches}` projection (§4.1); concrete presets are
/// external collaborators, but this crate ships one default so `--preset
/// conventional` works without wiring in a third-party preset module.
pub trait ConventionalPreset: Send + Sync {
    fn name(&self) -> &str;
    fn classify(&self, messages: &[String]) -> PresetCounts;
}

/// The built-in default preset: counts `feat` as a feature, `fix`/`perf` as a
/// patch, and any breaking marker/footer as breaking, mirroring the default
/// heuristic's own classification rules but tallied rather than maxed.
pub struct DefaultConventionalPreset;

impl ConventionalPreset for DefaultConventionalPreset {
    fn name(&self) -> &str {
        "conventional"
    }

    fn classify(&self, messages: &[String]) -> PresetCounts {
        let mut counts = PresetCounts::default();

        for message in messages {
            let header = message.lines().next().unwrap_or("");
            if message.contains("BREAKING CHANGE") || header.contains("!:") {
                counts.breaking += 1;
                continue;
            }

            match parse_conventional_commit(message) {
                Some(commit) if commit.commit_type == "feat" => counts.features += 1,
                Some(commit) if commit.commit_type == "fix" || commit.commit_type == "perf" => {
                    counts.patches += 1
                }
                _ => {}
            }
        }

        counts
    }
}

#[derive(Clone, Copy)]
pub enum ClassifierMode<'a> {
    Default,
    Conventional(&'a dyn ConventionalPreset),
}

/// Classifies a set of commit messages, returning their per-commit maximum
/// (§4.1: "the classifier returns the per-commit maximum").
pub fn classify_commits(messages: &[String], mode: ClassifierMode<'_>) -> BumpLevel {
    match mode {
        ClassifierMode::Default => messages
            .iter()
            .map(|message| classify_default(message))
            .max()
            .unwrap_or(BumpLevel::None),
        ClassifierMode::Conventional(preset) => preset.classify(messages).bump_level(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feat_header_yields_minor() {
        assert_eq!(classify_default("feat: add widget"), BumpLevel::Minor);
    }

    #[test]
    fn fix_header_yields_patch() {
        assert_eq!(classify_default("fix: off by one"), BumpLevel::Patch);
    }

    #[test]
    fn bang_marker_yields_major() {
        assert_eq!(classify_default("feat!: rework API"), BumpLevel::Major);
    }

    #[test]
    fn breaking_change_footer_yields_major() {
        let message = "feat: x\n\nBREAKING CHANGE: y";
        assert_eq!(classify_default(message), BumpLevel::Major);
    }

    #[test]
    fn unscoped_unconventional_message_yields_none() {
        assert_eq!(classify_default("update readme"), BumpLevel::None);
    }

    #[test]
    fn per_commit_maximum_across_a_set() {
        let messages = vec!["fix: a".to_string(), "feat: b".to_string()];
        assert_eq!(
            classify_commits(&messages, ClassifierMode::Default),
            BumpLevel::Minor
        );
    }

    #[test]
    fn conventional_preset_counts_match_default_semantics() {
        let messages = vec![
            "feat: a".to_string(),
            "fix: b".to_string(),
            "chore: c".to_string(),
        ];
        let preset = DefaultConventionalPreset;
        let counts = preset.classify(&messages);

        assert_eq!(
            counts,
            PresetCounts {
                breaking: 0,
                features: 1,
                patches: 1,
            }
        );
        assert_eq!(counts.bump_level(), BumpLevel::Minor);
    }

    #[test]
    fn scoped_header_parses_scope() {
        let commit = parse_conventional_commit("feat(core): add widget").unwrap();
        assert_eq!(commit.commit_type, "feat");
        assert_eq!(commit.scope.as_deref(), Some("core"));
        assert!(!commit.breaking);
    }
}
