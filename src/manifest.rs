use std::{collections::BTreeMap, fs, io::Write, path::Path};

use semver::Version;
use tempfile::NamedTempFile;
use toml_edit::{DocumentMut, Item, Value};

use crate::{
    errors::{ReleaseError, Result},
    workspace::{Package, Workspace},
};

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

/// Sets `[package].version` in `package`'s on-disk manifest to `next_version`.
pub fn bump_package_version(package: &Package, next_version: &Version) -> Result<()> {
    rewrite_manifest(&package.manifest_path, |doc| {
        let package_table = doc["package"].as_table_like_mut().ok_or_else(|| {
            ReleaseError::for_package(
                crate::errors::ErrorKind::Internal,
                package.name.clone(),
                "manifest has no [package] table",
            )
        })?;
        package_table.insert("version", Item::Value(Value::from(next_version.to_string())));
        Ok(())
    })
}

/// Rewrites every consumer's declared dependency range on `package_name` to
/// `next_version`, skipping workspace-protocol (path-only, unversioned)
/// edges: those carry no on-disk requirement to update (§3). Returns the
/// manifest paths actually touched.
pub fn rewrite_dependents(
    workspace: &Workspace,
    package_name: &str,
    next_version: &Version,
) -> Result<Vec<std::path::PathBuf>> {
    let mut touched = Vec::new();

    for (consumer, edge) in workspace.consumers_of(package_name) {
        if edge.is_workspace_path {
            continue;
        }

        let manifest_path = consumer.manifest_path.clone();
        let mut updated = false;
        rewrite_manifest(&manifest_path, |doc| {
            updated = update_dependency_version(doc, package_name, next_version);
            Ok(())
        })?;

        if updated {
            touched.push(manifest_path);
        }
    }

    Ok(touched)
}

/// Renders the manifest `package` would publish with: every workspace-path
/// dependency edge gets a concrete `version` requirement filled in from
/// `versions`, mirroring what `cargo package` does to path dependencies when
/// building a publishable archive. The on-disk manifest is left untouched;
/// this is purely an in-memory rendering for the archive step (C10).
pub fn render_archive_manifest(
    package: &Package,
    versions: &BTreeMap<String, Version>,
) -> Result<String> {
    let content = fs::read_to_string(&package.manifest_path)?;
    let mut doc = content.parse::<DocumentMut>()?;

    for edge in &package.dependencies {
        if !edge.is_workspace_path {
            continue;
        }

        let Some(version) = versions.get(&edge.name) else {
            continue;
        };

        for table_name in DEPENDENCY_TABLES {
            let Some(table) = doc.get_mut(table_name).and_then(Item::as_table_like_mut) else {
                continue;
            };
            let Some(entry) = table.get_mut(edge.name.as_str()) else {
                continue;
            };
            if let Some(entry_table) = entry.as_table_like_mut() {
                entry_table.insert("version", Item::Value(Value::from(format!("^{version}"))));
            }
        }
    }

    Ok(doc.to_string())
}

fn update_dependency_version(doc: &mut DocumentMut, name: &str, version: &Version) -> bool {
    let mut updated = false;

    for table_name in DEPENDENCY_TABLES {
        let Some(table) = doc.get_mut(table_name).and_then(Item::as_table_like_mut) else {
            continue;
        };
        let Some(entry) = table.get_mut(name) else {
            continue;
        };

        if let Some(entry_table) = entry.as_table_like_mut() {
            if let Some(existing) = entry_table.get("version").and_then(Item::as_str) {
                let rewritten = rewrite_preserving_operator(existing, version);
                entry_table.insert("version", Item::Value(Value::from(rewritten)));
                updated = true;
            }
        } else if let Some(existing) = entry.as_str() {
            let rewritten = rewrite_preserving_operator(existing, version);
            *entry = Item::Value(Value::from(rewritten));
            updated = true;
        }
    }

    updated
}

/// Rewrites a declared range to `version`, keeping the original range's
/// operator (caret, tilde, exact) — a bare version string is Cargo's
/// implicit caret and is rewritten bare, matching that convention (§4.4).
fn rewrite_preserving_operator(existing: &str, version: &Version) -> String {
    let trimmed = existing.trim();

    if trimmed.starts_with('=') {
        format!("={version}")
    } else if trimmed.starts_with('~') {
        format!("~{version}")
    } else if trimmed.starts_with('^') {
        format!("^{version}")
    } else {
        version.to_string()
    }
}

fn rewrite_manifest(path: &Path, mutate: impl FnOnce(&mut DocumentMut) -> Result<()>) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let mut doc = content.parse::<DocumentMut>()?;
    mutate(&mut doc)?;
    write_atomically(path, doc.to_string().as_bytes())
}

/// Write-temp-then-rename, matching the release index cache's atomic-write
/// approach: never leaves a manifest half-written if the process is killed
/// mid-write. Shared with the changelog writer (C9), which needs the same
/// guarantee for `CHANGELOG.md`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        ReleaseError::internal(format!("manifest path has no parent directory: {}", path.display()))
    })?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.persist(path)
        .map_err(|error| ReleaseError::internal(format!("failed to persist manifest write: {error}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyKind;
    use crate::workspace::DependencyEdge;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let package_dir = dir.join(name);
        fs::create_dir_all(&package_dir).unwrap();
        let manifest_path = package_dir.join("Cargo.toml");
        fs::write(&manifest_path, contents).unwrap();
        manifest_path
    }

    fn package(name: &str, manifest_path: PathBuf, dependencies: Vec<DependencyEdge>) -> Package {
        let directory = manifest_path.parent().unwrap().to_path_buf();
        Package {
            name: name.to_string(),
            version: Version::new(0, 1, 0),
            manifest_relative_path: PathBuf::from(format!("{name}/Cargo.toml")),
            manifest_path,
            directory_relative_path: PathBuf::from(name),
            directory,
            private: false,
            dependencies,
        }
    }

    #[test]
    fn bump_package_version_rewrites_package_table() {
        let dir = tempdir().unwrap();
        let manifest_path = write_manifest(
            dir.path(),
            "pkg-2",
            "[package]\nname = \"pkg-2\"\nversion = \"0.1.0\"\n",
        );
        let package = package("pkg-2", manifest_path.clone(), vec![]);

        bump_package_version(&package, &Version::new(0, 2, 0)).unwrap();

        let rewritten = fs::read_to_string(&manifest_path).unwrap();
        assert!(rewritten.contains("version = \"0.2.0\""));
    }

    #[test]
    fn rewrite_dependents_updates_table_and_inline_entries() {
        let dir = tempdir().unwrap();
        let table_manifest = write_manifest(
            dir.path(),
            "pkg-3",
            "[package]\nname = \"pkg-3\"\nversion = \"0.1.0\"\n\n[dependencies.pkg-2]\nversion = \"0.1.0\"\npath = \"../pkg-2\"\n",
        );
        let inline_manifest = write_manifest(
            dir.path(),
            "pkg-4",
            "[package]\nname = \"pkg-4\"\nversion = \"0.1.0\"\n\n[dependencies]\npkg-2 = { version = \"0.1.0\", path = \"../pkg-2\" }\n",
        );

        let pkg2 = package("pkg-2", dir.path().join("pkg-2/Cargo.toml"), vec![]);
        let pkg3 = package(
            "pkg-3",
            table_manifest.clone(),
            vec![DependencyEdge {
                name: "pkg-2".to_string(),
                kind: DependencyKind::Runtime,
                is_workspace_path: false,
            }],
        );
        let pkg4 = package(
            "pkg-4",
            inline_manifest.clone(),
            vec![DependencyEdge {
                name: "pkg-2".to_string(),
                kind: DependencyKind::Runtime,
                is_workspace_path: false,
            }],
        );

        let workspace = Workspace::from_packages_for_test(vec![pkg2, pkg3, pkg4]);
        let touched = rewrite_dependents(&workspace, "pkg-2", &Version::new(0, 2, 0)).unwrap();

        assert_eq!(touched.len(), 2);
        assert!(fs::read_to_string(&table_manifest)
            .unwrap()
            .contains("version = \"0.2.0\""));
        assert!(fs::read_to_string(&inline_manifest)
            .unwrap()
            .contains("0.2.0"));
    }

    #[test]
    fn rewrite_dependents_preserves_the_tilde_operator() {
        let dir = tempdir().unwrap();
        let manifest_path = write_manifest(
            dir.path(),
            "pkg-3",
            "[package]\nname = \"pkg-3\"\nversion = \"0.1.0\"\n\n[dependencies.pkg-2]\nversion = \"~0.1.0\"\npath = \"../pkg-2\"\n",
        );

        let pkg2 = package("pkg-2", dir.path().join("pkg-2/Cargo.toml"), vec![]);
        let pkg3 = package(
            "pkg-3",
            manifest_path.clone(),
            vec![DependencyEdge {
                name: "pkg-2".to_string(),
                kind: DependencyKind::Runtime,
                is_workspace_path: false,
            }],
        );

        let workspace = Workspace::from_packages_for_test(vec![pkg2, pkg3]);
        rewrite_dependents(&workspace, "pkg-2", &Version::new(0, 2, 0)).unwrap();

        let content = fs::read_to_string(&manifest_path).unwrap();
        assert!(content.contains("version = \"~0.2.0\""));
    }

    #[test]
    fn workspace_protocol_edges_are_left_on_disk() {
        let dir = tempdir().unwrap();
        let manifest_path = write_manifest(
            dir.path(),
            "pkg-3",
            "[package]\nname = \"pkg-3\"\nversion = \"0.1.0\"\n\n[dependencies]\npkg-2 = { path = \"../pkg-2\" }\n",
        );

        let pkg2 = package("pkg-2", dir.path().join("pkg-2/Cargo.toml"), vec![]);
        let pkg3 = package(
            "pkg-3",
            manifest_path.clone(),
            vec![DependencyEdge {
                name: "pkg-2".to_string(),
                kind: DependencyKind::Runtime,
                is_workspace_path: true,
            }],
        );

        let workspace = Workspace::from_packages_for_test(vec![pkg2, pkg3]);
        let touched = rewrite_dependents(&workspace, "pkg-2", &Version::new(0, 2, 0)).unwrap();

        assert!(touched.is_empty());
        let content = fs::read_to_string(&manifest_path).unwrap();
        assert!(!content.contains("version"));
    }

    #[test]
    fn archive_manifest_injects_a_version_for_path_dependencies() {
        let dir = tempdir().unwrap();
        let manifest_path = write_manifest(
            dir.path(),
            "pkg-3",
            "[package]\nname = \"pkg-3\"\nversion = \"0.1.0\"\n\n[dependencies]\npkg-2 = { path = \"../pkg-2\" }\n",
        );

        let pkg3 = package(
            "pkg-3",
            manifest_path,
            vec![DependencyEdge {
                name: "pkg-2".to_string(),
                kind: DependencyKind::Runtime,
                is_workspace_path: true,
            }],
        );

        let mut versions = BTreeMap::new();
        versions.insert("pkg-2".to_string(), Version::new(0, 2, 0));

        let rendered = render_archive_manifest(&pkg3, &versions).unwrap();
        assert!(rendered.contains("version = \"^0.2.0\""));
    }
}
