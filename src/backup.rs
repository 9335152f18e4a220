use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::errors::Result;

/// A snapshot of the manifests APPLY is about to touch, so ABORT_RESTORE
/// (§5) can put the working tree back exactly as it was. Backed by a scratch
/// directory that self-removes on drop; `restore` and `discard` both consume
/// the backup so it can't be used twice.
pub struct ManifestBackup {
    _dir: TempDir,
    entries: Vec<(PathBuf, PathBuf)>,
}

impl ManifestBackup {
    /// Copies every manifest in `paths` into a fresh scratch directory.
    pub fn snapshot(paths: &BTreeSet<PathBuf>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("cargo-monorelease-backup-")
            .tempdir()?;

        let mut entries = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let backup_path = dir.path().join(format!("{index}.toml"));
            fs::copy(path, &backup_path)?;
            entries.push((path.clone(), backup_path));
        }

        Ok(Self { _dir: dir, entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn touched_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(original, _)| original.as_path())
    }

    /// Copies every snapshotted manifest back over its original path.
    pub fn restore(self) -> Result<()> {
        for (original, backup) in &self.entries {
            fs::copy(backup, original)?;
        }
        Ok(())
    }

    /// No-op besides dropping the scratch directory: the on-disk state is
    /// kept as APPLY left it.
    pub fn discard(self) {}
}
