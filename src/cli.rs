use clap::{ArgAction, Args, Parser, Subcommand};

use crate::types::{BumpLevel, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "cargo monorelease",
    bin_name = "cargo monorelease",
    version,
    about = "Conventional-commit-driven release automation for Cargo monorepos"
)]
pub struct Cli {
    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List workspace packages and publishability metadata.
    List,
    /// List changed workspace packages since a base ref.
    Changed(ChangedArgs),
    /// Run the full release pipeline: analyze, propagate, bump, publish, record.
    Release(ReleaseArgs),
    /// Render changelog fragments without writing, publishing, or tagging anything.
    ChangelogPreview(ChangelogPreviewArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ChangedArgs {
    /// Base ref used for merge-base and diff calculation.
    #[arg(long, default_value = "origin/main")]
    pub base: String,
    /// Pin the analysis range's end to this commit instead of the working
    /// tree's current HEAD (`git.commitSha`). Useful for reproducing a past
    /// analysis or analyzing the commit a CI job was triggered against.
    #[arg(long, value_name = "SHA")]
    pub commit_sha: Option<String>,
    /// Include staged, unstaged, and untracked paths.
    #[arg(long)]
    pub include_uncommitted: bool,
    /// Disable reverse dependency expansion and return direct matches only.
    #[arg(long)]
    pub direct_only: bool,
}

#[derive(Debug, Clone, Args)]
#[group(id = "target-selector", multiple = false)]
pub struct TargetArgs {
    /// Select all workspace packages (default when omitted).
    #[arg(long, action = ArgAction::SetTrue, group = "target-selector")]
    pub all: bool,
    /// Select packages changed since `--base`.
    #[arg(long, action = ArgAction::SetTrue, group = "target-selector")]
    pub changed: bool,
    /// Select one or more explicit package names.
    #[arg(long, value_name = "PACKAGE", group = "target-selector")]
    pub package: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub changed: ChangedArgs,
    /// Force this bump level on the resolved target set instead of
    /// classifying commit messages since `--base`.
    #[arg(long, value_enum)]
    pub level: Option<BumpLevel>,
    /// Run the full pipeline without uploading archives, committing, or
    /// pushing tags.
    #[arg(long)]
    pub dry_run: bool,
    /// Conventional-commits preset name; omit for the default heuristic.
    #[arg(long)]
    pub preset: Option<String>,
    /// Registry base URL to publish to; omit to skip publishing entirely.
    #[arg(long)]
    pub registry: Option<String>,
    /// Allow execution with a dirty working tree.
    #[arg(long)]
    pub allow_dirty: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ChangelogPreviewArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub changed: ChangedArgs,
    /// Force this bump level on the resolved target set instead of
    /// classifying commit messages since `--base`.
    #[arg(long, value_enum)]
    pub level: Option<BumpLevel>,
}

pub fn parse_from_env() -> Cli {
    Cli::parse()
}
