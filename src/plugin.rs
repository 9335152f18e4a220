use async_trait::async_trait;
use tracing::{info, warn};

use crate::recorder::ReleaseDescriptor;

/// A single lifecycle hook point, per the typed-hook-registry design (§9):
/// `on_release_available` fires after C11 pushes (or after its dry-run
/// no-op), carrying the descriptors of every package that was released.
///
/// `Plugin` is dyn-compatible via `async_trait` so `PluginHost` can hold a
/// heterogeneous, runtime-registered `Vec<Box<dyn Plugin>>` (§4.9/§9:
/// "the plugin system relies on runtime registration of named handlers").
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn on_release_available(&self, releases: &[ReleaseDescriptor]) -> Result<(), String>;
}

/// Ordered registry of plugins. Hooks run sequentially in registration
/// order; a hook failure is logged and reported but never aborts the
/// pipeline (§4.9 — releases are already durable by the time NOTIFY runs).
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
}

/// One plugin's hook failure, surfaced in the final summary rather than as
/// a pipeline-aborting error.
#[derive(Debug, Clone)]
pub struct PluginFailure {
    pub plugin_name: String,
    pub message: String,
}

impl PluginHost {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Invokes `on_release_available` on every registered plugin in order,
    /// collecting (not aborting on) failures.
    pub async fn notify_release_available(
        &self,
        releases: &[ReleaseDescriptor],
    ) -> Vec<PluginFailure> {
        let mut failures = Vec::new();

        for plugin in &self.plugins {
            info!(
                command_path = "plugin.on-release-available",
                plugin_name = plugin.name(),
                action = "invoke-hook",
                outcome = "started",
                "Invoking plugin hook"
            );

            match plugin.on_release_available(releases).await {
                Ok(()) => {
                    info!(
                        command_path = "plugin.on-release-available",
                        plugin_name = plugin.name(),
                        action = "invoke-hook",
                        outcome = "success",
                        "Plugin hook completed"
                    );
                }
                Err(message) => {
                    warn!(
                        command_path = "plugin.on-release-available",
                        plugin_name = plugin.name(),
                        action = "invoke-hook",
                        outcome = "failed",
                        error = %message,
                        "Plugin hook failed; continuing (releases are already durable)"
                    );
                    failures.push(PluginFailure {
                        plugin_name: plugin.name().to_string(),
                        message,
                    });
                }
            }
        }

        failures
    }
}

/// Illustrative plugin: writes a one-line summary of each release to the
/// structured log. Ships so `--help` output and the CLI's default plugin
/// list aren't empty, per SPEC_FULL's "a couple of illustrative [plugins]".
pub struct LoggingPlugin;

#[async_trait]
impl Plugin for LoggingPlugin {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_release_available(&self, releases: &[ReleaseDescriptor]) -> Result<(), String> {
        for release in releases {
            info!(
                command_path = "plugin.logging",
                package_name = %release.name,
                previous_version = %release.previous_version,
                new_version = %release.new_version,
                tag_name = %release.tag_name,
                "Package released"
            );
        }

        Ok(())
    }
}
