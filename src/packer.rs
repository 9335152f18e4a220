use std::{fs, io::Write, path::Path};

use flate2::{write::GzEncoder, Compression};
use walkdir::WalkDir;

use crate::{
    errors::{ErrorKind, ReleaseError, Result},
    workspace::Package,
};

const EXCLUDED_DIRS: [&str; 3] = ["target", ".git", "node_modules"];

/// Packs `package`'s directory into a gzipped tarball (the `pack` step of
/// §4.7's `prepublish-hook → pack → upload → postpublish-hook` pipeline).
/// `rendered_manifest` replaces the on-disk `Cargo.toml` entry in the
/// archive — the in-memory, workspace-path-resolved manifest from
/// `manifest::render_archive_manifest`, never the on-disk workspace-protocol
/// one (§4.4, §9 "manifest kinds").
pub fn pack_archive(package: &Package, rendered_manifest: &str) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in WalkDir::new(&package.directory)
        .into_iter()
        .filter_entry(|entry| !is_excluded(&package.directory, entry.path()))
    {
        let entry = entry.map_err(|error| {
            ReleaseError::for_package(
                ErrorKind::Publish,
                package.name.clone(),
                format!("Failed to walk package directory: {error}"),
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(&package.directory)
            .unwrap_or(entry.path());

        if relative_path == Path::new("Cargo.toml") {
            continue;
        }

        let mut file = fs::File::open(entry.path())?;
        builder
            .append_file(relative_path, &mut file)
            .map_err(|error| archive_error(&package.name, error))?;
    }

    append_manifest(&mut builder, rendered_manifest)
        .map_err(|error| archive_error(&package.name, error))?;

    let encoder = builder.into_inner().map_err(|error| archive_error(&package.name, error))?;
    encoder
        .finish()
        .map_err(|error| archive_error(&package.name, error))
}

fn append_manifest<W: Write>(builder: &mut tar::Builder<W>, rendered_manifest: &str) -> std::io::Result<()> {
    let bytes = rendered_manifest.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "Cargo.toml", bytes)
}

fn is_excluded(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };

    relative
        .components()
        .next()
        .map(|component| EXCLUDED_DIRS.contains(&component.as_os_str().to_string_lossy().as_ref()))
        .unwrap_or(false)
}

fn archive_error(package_name: &str, error: std::io::Error) -> ReleaseError {
    ReleaseError::for_package(
        ErrorKind::Publish,
        package_name.to_string(),
        format!("Failed to build package archive: {error}"),
    )
}
