use std::path::PathBuf;

use crate::types::Access;

/// In-memory configuration assembled by the CLI from flags, or constructed
/// directly by library embedders. There is no on-disk config file format;
/// loading one is an external-collaborator concern.
#[derive(Debug, Clone)]
pub struct Config {
    pub cwd: PathBuf,
    pub dry_run: bool,
    pub git: GitConfig,
    pub conventional_changelog_preset: Option<String>,
    pub changelog_filename: String,
    pub access: Access,
    pub registry_url: Option<String>,
    pub no_registry: bool,
    pub persist_versions: bool,
    pub max_concurrent_writes: usize,
    pub jobs: Option<usize>,
    pub topological: bool,
    pub topological_dev: bool,
    pub prerelease: bool,
    pub prerelease_tag: Option<String>,
    pub auto_commit: bool,
    pub auto_commit_message: String,
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    pub base_branch: String,
    pub commit_sha: Option<String>,
    pub remote: String,
    pub push: bool,
}

impl GitConfig {
    /// The analysis range's end (§4.2/§6 `git.commitSha`): the pinned commit
    /// when one was configured, `"HEAD"` otherwise.
    pub fn head_ref(&self) -> &str {
        self.commit_sha.as_deref().unwrap_or("HEAD")
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_branch: "origin/main".to_string(),
            commit_sha: None,
            remote: "origin".to_string(),
            push: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            dry_run: false,
            git: GitConfig::default(),
            conventional_changelog_preset: None,
            changelog_filename: "CHANGELOG.md".to_string(),
            access: Access::default(),
            registry_url: None,
            no_registry: false,
            persist_versions: true,
            // §5: `jobs = unbounded`, `maxConcurrentWrites = 1`.
            max_concurrent_writes: 1,
            jobs: None,
            topological: false,
            topological_dev: false,
            prerelease: false,
            prerelease_tag: None,
            auto_commit: true,
            auto_commit_message: "chore(release): publish {packages}".to_string(),
        }
    }
}

impl Config {
    /// Effective bound on simultaneous per-package pipelines. `None` means
    /// unbounded, which we represent as the largest permit count
    /// `tokio::sync::Semaphore` accepts (tokio has no literal "unbounded"
    /// semaphore, and `Semaphore::new` asserts against `MAX_PERMITS`).
    pub fn effective_jobs(&self) -> usize {
        self.jobs
            .map(|n| n.min(tokio::sync::Semaphore::MAX_PERMITS))
            .unwrap_or(tokio::sync::Semaphore::MAX_PERMITS)
    }

    pub fn render_commit_message(&self, package_names: &[String]) -> String {
        self.auto_commit_message
            .replace("{packages}", &package_names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_jobs_defaults_to_the_semaphore_permit_ceiling() {
        let config = Config::default();
        assert_eq!(config.effective_jobs(), tokio::sync::Semaphore::MAX_PERMITS);
    }

    #[test]
    fn effective_jobs_passes_through_a_configured_value() {
        let mut config = Config::default();
        config.jobs = Some(4);
        assert_eq!(config.effective_jobs(), 4);
    }

    #[test]
    fn effective_jobs_caps_a_configured_value_above_the_semaphore_ceiling() {
        let mut config = Config::default();
        config.jobs = Some(usize::MAX);
        assert_eq!(config.effective_jobs(), tokio::sync::Semaphore::MAX_PERMITS);
    }
}
