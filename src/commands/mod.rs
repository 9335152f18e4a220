mod changed;
mod changelog_preview;
mod list;
mod release;
pub mod targeting;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    cli::{ChangedArgs, ChangelogPreviewArgs, Cli, Command, ReleaseArgs, TargetArgs},
    errors::Result,
    types::OutputFormat,
    ReleaseApp,
};

pub async fn execute(cli: Cli, app: &ReleaseApp) -> Result<i32> {
    match cli.command {
        Command::List => list::execute(cli.output, app),
        Command::Changed(args) => changed::execute(&args, cli.output, app),
        Command::Release(args) => release::execute(&args, cli.output, app).await,
        Command::ChangelogPreview(args) => changelog_preview::execute(&args, cli.output, app),
    }
}

pub fn print_output<T: Serialize>(
    output: OutputFormat,
    human_line: &str,
    json_value: &T,
) -> Result<()> {
    match output {
        OutputFormat::Human => println!("{human_line}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(json_value)?),
    }

    Ok(())
}

pub fn log_invocation(command: &Command, output: OutputFormat) {
    let metadata = command_invocation_metadata(command, output);
    let arg_shape = serde_json::to_string(&metadata.arg_shape).unwrap_or_else(|_| "{}".to_string());

    info!(
        command_path = metadata.command_path,
        arg_shape = %arg_shape,
        action = "invoke-command",
        outcome = "started",
        "Running command"
    );
}

struct CommandInvocationMetadata {
    command_path: &'static str,
    arg_shape: Value,
}

fn command_invocation_metadata(command: &Command, output: OutputFormat) -> CommandInvocationMetadata {
    match command {
        Command::List => CommandInvocationMetadata {
            command_path: "cargo-monorelease.list",
            arg_shape: json!({ "output": output.as_str() }),
        },
        Command::Changed(args) => CommandInvocationMetadata {
            command_path: "cargo-monorelease.changed",
            arg_shape: changed_arg_shape(args, output),
        },
        Command::Release(args) => CommandInvocationMetadata {
            command_path: "cargo-monorelease.release",
            arg_shape: release_arg_shape(args, output),
        },
        Command::ChangelogPreview(args) => CommandInvocationMetadata {
            command_path: "cargo-monorelease.changelog-preview",
            arg_shape: changelog_preview_arg_shape(args, output),
        },
    }
}

fn changed_arg_shape(args: &ChangedArgs, output: OutputFormat) -> Value {
    json!({
        "output": output.as_str(),
        "base_ref": args.base,
        "commit_sha": args.commit_sha,
        "include_uncommitted": args.include_uncommitted,
        "direct_only": args.direct_only
    })
}

fn release_arg_shape(args: &ReleaseArgs, output: OutputFormat) -> Value {
    json!({
        "output": output.as_str(),
        "target_selector": target_selector_key(&args.target),
        "package_count": args.target.package.len(),
        "base_ref": args.changed.base,
        "commit_sha": args.changed.commit_sha,
        "level": args.level.map(|level| level.as_str()),
        "preset": args.preset,
        "dry_run": args.dry_run,
        "registry_provided": args.registry.is_some(),
        "allow_dirty": args.allow_dirty
    })
}

fn changelog_preview_arg_shape(args: &ChangelogPreviewArgs, output: OutputFormat) -> Value {
    json!({
        "output": output.as_str(),
        "target_selector": target_selector_key(&args.target),
        "package_count": args.target.package.len(),
        "base_ref": args.changed.base,
        "commit_sha": args.changed.commit_sha,
        "level": args.level.map(|level| level.as_str())
    })
}

fn target_selector_key(target: &TargetArgs) -> &'static str {
    if target.changed {
        return "changed";
    }

    if !target.package.is_empty() {
        return "package";
    }

    "all"
}
