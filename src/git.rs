use std::{
    collections::BTreeSet,
    ffi::OsString,
    path::PathBuf,
    process::{Command, Output},
};

use crate::errors::{with_context, ErrorKind, ReleaseError, Result};

#[derive(Debug, Clone)]
pub struct ChangedFiles {
    pub merge_base: String,
    pub paths: BTreeSet<PathBuf>,
}

pub fn current_head() -> Result<String> {
    run_git_capture(&["rev-parse", "HEAD"])
}

pub fn resolve_sha(reference: &str) -> Result<String> {
    run_git_capture(&["rev-parse", reference]).map_err(|error| {
        with_context(ErrorKind::Analysis, &format!("Failed to resolve ref `{reference}`"), error)
    })
}

/// Merge-base of `base_ref` and `head_ref` (§4.2's two-input model: the
/// analysis range runs from `baseBranch` to `commitSha`, not implicitly to
/// whatever `HEAD` happens to be when the process runs).
pub fn merge_base(base_ref: &str, head_ref: &str) -> Result<String> {
    run_git_capture(&["merge-base", base_ref, head_ref]).map_err(|error| {
        with_context(
            ErrorKind::Analysis,
            &format!("Failed to resolve merge-base for base ref `{base_ref}`"),
            error,
        )
    })
}

pub fn changed_files(base_ref: &str, head_ref: &str, include_uncommitted: bool) -> Result<ChangedFiles> {
    let head_sha = resolve_sha(head_ref)?;
    let merge_base = merge_base(base_ref, &head_sha)?;
    let diff_output = run_git_capture(&["diff", "--name-only", &merge_base, &head_sha])?;
    let mut paths = parse_paths(&diff_output);

    if include_uncommitted {
        let staged_output = run_git_capture(&["diff", "--name-only", "--cached"])?;
        let unstaged_output = run_git_capture(&["diff", "--name-only"])?;
        let untracked_output = run_git_capture(&["ls-files", "--others", "--exclude-standard"])?;

        paths.extend(parse_paths(&staged_output));
        paths.extend(parse_paths(&unstaged_output));
        paths.extend(parse_paths(&untracked_output));
    }

    Ok(ChangedFiles { merge_base, paths })
}

/// Commit message bodies (subject + body, separated by a NUL record
/// separator) between `base_ref` and `head_ref`. Used by C4/C5.
pub fn log_messages(base_ref: &str, head_ref: &str) -> Result<Vec<String>> {
    let head_sha = resolve_sha(head_ref)?;
    let merge_base = merge_base(base_ref, &head_sha)?;
    let range = format!("{merge_base}..{head_sha}");
    let output = run_git_capture(&["log", "--format=%B%x00", &range]).map_err(|error| {
        with_context(ErrorKind::Analysis, "Failed to read commit log", error)
    })?;

    Ok(output
        .split('\0')
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn is_working_tree_clean() -> Result<bool> {
    let output = run_git_capture(&["status", "--porcelain", "--untracked-files=normal"])?;
    Ok(output.trim().is_empty())
}

pub fn ensure_clean_working_tree(allow_dirty: bool) -> Result<()> {
    if allow_dirty {
        return Ok(());
    }

    if is_working_tree_clean()? {
        return Ok(());
    }

    Err(ReleaseError::workspace(
        "Working tree is dirty; re-run with --allow-dirty to bypass this check",
    ))
}

pub fn add_paths(paths: &BTreeSet<PathBuf>) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }

    let mut args = Vec::<OsString>::new();
    args.push(OsString::from("add"));
    args.push(OsString::from("--"));
    for path in paths {
        args.push(path.as_os_str().to_os_string());
    }

    run_git_os(args)?;
    Ok(())
}

pub fn commit_paths(message: &str, paths: &BTreeSet<PathBuf>) -> Result<String> {
    let mut args = Vec::<OsString>::new();
    args.push(OsString::from("commit"));
    args.push(OsString::from("-m"));
    args.push(OsString::from(message));

    if !paths.is_empty() {
        args.push(OsString::from("--"));
        for path in paths {
            args.push(path.as_os_str().to_os_string());
        }
    }

    run_git_os(args)?;
    current_head()
}

/// Returns `Some(sha)` the tag currently points at, or `None` if it doesn't
/// exist. Backs the idempotent tag-creation contract (§4.8, I6).
pub fn tag_exists(tag: &str) -> Result<Option<String>> {
    let output = Command::new("git")
        .args(["rev-list", "-n", "1", tag])
        .output()
        .map_err(|error| with_context(ErrorKind::Record, "Failed to execute git", error))?;

    if !output.status.success() {
        return Ok(None);
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        Ok(None)
    } else {
        Ok(Some(sha))
    }
}

/// Creates an annotated tag `tag` with `message`. Idempotent: if the tag
/// already points at HEAD, this is a no-op; if it points elsewhere, it fails
/// rather than silently moving the tag (§4.8).
pub fn create_annotated_tag(tag: &str, message: &str) -> Result<()> {
    let head = current_head()?;

    if let Some(existing_sha) = tag_exists(tag)? {
        if existing_sha == head {
            return Ok(());
        }

        return Err(ReleaseError::record(format!(
            "Tag `{tag}` already exists and points at a different commit ({existing_sha} != {head})"
        )));
    }

    run_git(&["tag", "-a", tag, "-m", message])?;
    Ok(())
}

pub fn push(remote: &str, refs: &[String]) -> Result<()> {
    let mut args = vec!["push".to_string(), remote.to_string()];
    args.extend(refs.iter().cloned());

    let args_ref = args.iter().map(String::as_str).collect::<Vec<_>>();
    run_git(&args_ref).map_err(|error| with_context(ErrorKind::Record, "git push failed", error))?;
    Ok(())
}

fn parse_paths(output: &str) -> BTreeSet<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn run_git(args: &[&str]) -> Result<Output> {
    let output = Command::new("git")
        .args(args)
        .output()
        .map_err(|error| with_context(ErrorKind::Analysis, "Failed to execute git", error))?;

    ensure_success(&output, args.join(" "))?;
    Ok(output)
}

fn run_git_os(args: Vec<OsString>) -> Result<Output> {
    let output = Command::new("git")
        .args(args.iter().map(OsString::as_os_str))
        .output()
        .map_err(|error| with_context(ErrorKind::Analysis, "Failed to execute git", error))?;

    let command = args
        .iter()
        .map(|part| part.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    ensure_success(&output, command)?;
    Ok(output)
}

fn run_git_capture(args: &[&str]) -> Result<String> {
    let output = run_git(args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn ensure_success(output: &Output, command: String) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("git {command} failed with status {}", output.status)
    } else {
        format!("git {command} failed: {stderr}")
    };

    Err(ReleaseError::analysis(message))
}
