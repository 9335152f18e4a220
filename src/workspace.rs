use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use cargo_metadata::{DependencyKind as CargoDependencyKind, MetadataCommand, PackageId};
use semver::{Version, VersionReq};
use serde::Serialize;

use crate::{
    errors::{ReleaseError, Result},
    types::DependencyKind,
};

pub const GLOBAL_IMPACT_FILES: [&str; 3] = ["Cargo.toml", "Cargo.lock", "rust-toolchain"];

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub name: String,
    pub kind: DependencyKind,
    /// True when declared as a Cargo path dependency with no registry
    /// `version` requirement — the workspace-protocol equivalent (§3).
    pub is_workspace_path: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest_relative_path: PathBuf,
    pub directory: PathBuf,
    pub directory_relative_path: PathBuf,
    /// Derived from the Cargo `publish` manifest key. Private packages never
    /// publish but still participate in the dependency graph (§3).
    pub private: bool,
    /// Workspace-internal dependency edges only; edges to external crates
    /// play no role in propagation or manifest rewriting.
    pub dependencies: Vec<DependencyEdge>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    packages: BTreeMap<String, Package>,
    /// consumer -> providers it depends on (workspace-internal only)
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// provider -> consumers that depend on it (reverse edges, for C6)
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl Workspace {
    pub fn load(cwd: &Path) -> Result<Self> {
        let metadata = MetadataCommand::new().current_dir(cwd).exec()?;
        let root = metadata.workspace_root.as_std_path().to_path_buf();

        let workspace_members = metadata
            .workspace_members
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>();

        let mut id_to_name = HashMap::<PackageId, String>::new();
        for package in &metadata.packages {
            if workspace_members.contains(&package.id) {
                id_to_name.insert(package.id.clone(), package.name.clone());
            }
        }

        let mut packages = BTreeMap::<String, Package>::new();

        for package in metadata
            .packages
            .iter()
            .filter(|pkg| workspace_members.contains(&pkg.id))
        {
            let manifest_path = package.manifest_path.as_std_path().to_path_buf();
            let manifest_relative_path = manifest_path
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .map_err(|error| {
                    ReleaseError::workspace(format!(
                        "Workspace manifest is outside workspace root: {} ({error})",
                        manifest_path.display()
                    ))
                })?;
            let directory = manifest_path
                .parent()
                .ok_or_else(|| {
                    ReleaseError::workspace(format!(
                        "Failed to resolve package directory from manifest path: {}",
                        manifest_path.display()
                    ))
                })?
                .to_path_buf();
            let directory_relative_path = directory
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .map_err(|error| {
                    ReleaseError::workspace(format!(
                        "Workspace package directory is outside workspace root: {} ({error})",
                        directory.display()
                    ))
                })?;

            let private = package
                .publish
                .as_ref()
                .is_some_and(|registries| registries.is_empty());

            let dependencies = package
                .dependencies
                .iter()
                .filter(|dependency| id_to_name.values().any(|name| name == &dependency.name))
                .map(|dependency| DependencyEdge {
                    name: dependency.name.clone(),
                    kind: map_dependency_kind(dependency.kind, dependency.optional),
                    is_workspace_path: dependency.path.is_some() && dependency.req == VersionReq::STAR,
                })
                .collect::<Vec<_>>();

            let entry = Package {
                name: package.name.clone(),
                version: package.version.clone(),
                manifest_path,
                manifest_relative_path,
                directory,
                directory_relative_path,
                private,
                dependencies,
            };

            packages.insert(package.name.clone(), entry);
        }

        let mut dependencies = packages
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect::<BTreeMap<_, _>>();
        let mut dependents = packages
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect::<BTreeMap<_, _>>();

        for (name, package) in &packages {
            for edge in &package.dependencies {
                dependencies
                    .entry(name.clone())
                    .or_default()
                    .insert(edge.name.clone());
                dependents
                    .entry(edge.name.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        Ok(Self {
            root,
            packages,
            dependencies,
            dependents,
        })
    }

    pub fn all_package_names(&self) -> BTreeSet<String> {
        self.packages.keys().cloned().collect()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Dependency edges pointing *into* `name`, i.e. `name`'s own dependencies
    /// that are workspace-internal. Used by C7 to know which manifests to
    /// rewrite when `name` is bumped: any consumer with an edge to `name`.
    pub fn consumers_of(&self, name: &str) -> Vec<(&Package, &DependencyEdge)> {
        self.packages
            .values()
            .flat_map(|package| {
                package
                    .dependencies
                    .iter()
                    .filter(move |edge| edge.name == name)
                    .map(move |edge| (package, edge))
            })
            .collect()
    }

    pub fn changed_packages(
        &self,
        changed_paths: &BTreeSet<PathBuf>,
        include_dependents: bool,
    ) -> BTreeSet<String> {
        if changed_paths
            .iter()
            .any(|path| self.is_global_impact_path(path))
        {
            return self.all_package_names();
        }

        let mut direct_matches = BTreeSet::new();

        for raw_path in changed_paths {
            let Some(relative_path) = self.normalize_relative_path(raw_path) else {
                continue;
            };

            for (name, package) in &self.packages {
                if relative_path.starts_with(&package.directory_relative_path) {
                    direct_matches.insert(name.clone());
                }
            }
        }

        if include_dependents {
            return self.expand_dependents(&direct_matches);
        }

        direct_matches
    }

    pub fn expand_dependents(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        let mut expanded = names.clone();
        let mut queue = names.iter().cloned().collect::<Vec<_>>();

        while let Some(current) = queue.pop() {
            let Some(next_dependents) = self.dependents.get(&current) else {
                continue;
            };

            for dependent in next_dependents {
                if expanded.insert(dependent.clone()) {
                    queue.push(dependent.clone());
                }
            }
        }

        expanded
    }

    /// Kahn's algorithm restricted to `selected`. Errors on a cycle, per the
    /// explicit cycle-rejection policy (§9).
    pub fn topological_order(&self, selected: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut indegree = selected
            .iter()
            .map(|name| {
                let count = self
                    .dependencies
                    .get(name)
                    .map_or(0usize, |deps| deps.intersection(selected).count());
                (name.clone(), count)
            })
            .collect::<BTreeMap<_, _>>();

        let mut ready = indegree
            .iter()
            .filter_map(|(name, degree)| (*degree == 0).then(|| name.clone()))
            .collect::<BTreeSet<_>>();

        let mut ordered = Vec::with_capacity(selected.len());

        while let Some(name) = ready.first().cloned() {
            ready.remove(&name);
            ordered.push(name.clone());

            if let Some(next) = self.dependents.get(&name) {
                for dependent in next {
                    if !selected.contains(dependent) {
                        continue;
                    }

                    let Some(degree) = indegree.get_mut(dependent) else {
                        continue;
                    };

                    if *degree > 0 {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(dependent.clone());
                        }
                    }
                }
            }
        }

        if ordered.len() != selected.len() {
            return Err(ReleaseError::workspace(
                "Dependency cycle detected among workspace packages",
            ));
        }

        Ok(ordered)
    }

    /// Groups `selected` into topological "levels": level 0 has no selected
    /// dependencies, level N depends only on levels < N. Used by the publish
    /// scheduler's `topological` mode (§4.7). `include_dev` mirrors the
    /// `topologicalDev` option (§6): when unset, dev-dependency edges are
    /// dropped from the level computation, so a package is only held back by
    /// its runtime/build/peer dependencies. The underlying visitation order
    /// still comes from the full graph (including dev edges), since any
    /// topological order of a graph remains valid for one of its subgraphs.
    pub fn topological_levels(
        &self,
        selected: &BTreeSet<String>,
        include_dev: bool,
    ) -> Result<Vec<Vec<String>>> {
        let order = self.topological_order(selected)?;
        let mut level_of = BTreeMap::<String, usize>::new();

        for name in &order {
            let deps_in_selection = self.filtered_dependencies_of(name, include_dev);

            let level = deps_in_selection
                .iter()
                .filter(|dep| selected.contains(*dep))
                .map(|dep| level_of.get(dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);

            level_of.insert(name.clone(), level);
        }

        let max_level = level_of.values().copied().max().unwrap_or(0);
        let mut levels = vec![Vec::new(); max_level + 1];
        for name in order {
            let level = level_of[&name];
            levels[level].push(name);
        }

        Ok(levels)
    }

    /// `name`'s workspace-internal dependency names, optionally excluding
    /// `Development`-kind edges (§6 `topologicalDev`).
    fn filtered_dependencies_of(&self, name: &str, include_dev: bool) -> BTreeSet<String> {
        let Some(package) = self.packages.get(name) else {
            return BTreeSet::new();
        };

        package
            .dependencies
            .iter()
            .filter(|edge| include_dev || edge.kind != DependencyKind::Development)
            .map(|edge| edge.name.clone())
            .collect()
    }

    fn normalize_relative_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.strip_prefix(&self.root).ok().map(Path::to_path_buf);
        }

        if let Ok(without_prefix) = path.strip_prefix("./") {
            return Some(without_prefix.to_path_buf());
        }

        Some(path.to_path_buf())
    }

    fn is_global_impact_path(&self, path: &Path) -> bool {
        let Some(relative) = self.normalize_relative_path(path) else {
            return false;
        };

        GLOBAL_IMPACT_FILES
            .iter()
            .any(|global| relative == Path::new(global))
    }

    /// Builds a workspace from an in-memory package list, deriving the
    /// forward/reverse dependency maps the same way `load` does. Used by
    /// other modules' test suites that need a workspace fixture without
    /// shelling out to `cargo metadata`.
    #[cfg(test)]
    pub fn from_packages_for_test(packages: Vec<Package>) -> Self {
        let packages = packages
            .into_iter()
            .map(|package| (package.name.clone(), package))
            .collect::<BTreeMap<_, _>>();

        let mut dependencies = packages
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect::<BTreeMap<_, _>>();
        let mut dependents = packages
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect::<BTreeMap<_, _>>();

        for (name, package) in &packages {
            for edge in &package.dependencies {
                dependencies
                    .entry(name.clone())
                    .or_default()
                    .insert(edge.name.clone());
                dependents
                    .entry(edge.name.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        Self {
            root: PathBuf::from("/repo"),
            packages,
            dependencies,
            dependents,
        }
    }
}

fn map_dependency_kind(kind: CargoDependencyKind, optional: bool) -> DependencyKind {
    if optional {
        return DependencyKind::Optional;
    }

    match kind {
        CargoDependencyKind::Development => DependencyKind::Development,
        CargoDependencyKind::Build => DependencyKind::Build,
        CargoDependencyKind::Normal | CargoDependencyKind::Unknown => DependencyKind::Runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, root: &Path, dependencies: Vec<DependencyEdge>) -> Package {
        let directory_relative_path = PathBuf::from(format!("crates/{name}"));
        let manifest_relative_path = directory_relative_path.join("Cargo.toml");

        Package {
            name: name.to_string(),
            version: Version::new(0, 1, 0),
            manifest_path: root.join(&manifest_relative_path),
            manifest_relative_path,
            directory: root.join(&directory_relative_path),
            directory_relative_path,
            private: false,
            dependencies,
        }
    }

    fn edge(name: &str, kind: DependencyKind) -> DependencyEdge {
        DependencyEdge {
            name: name.to_string(),
            kind,
            is_workspace_path: true,
        }
    }

    fn fixture_workspace() -> Workspace {
        let root = PathBuf::from("/repo");
        let packages = [
            ("app", vec![edge("core", DependencyKind::Runtime)]),
            ("cli", vec![edge("core", DependencyKind::Runtime)]),
            ("core", vec![]),
        ]
        .into_iter()
        .map(|(name, deps)| (name.to_string(), package(name, &root, deps)))
        .collect::<BTreeMap<_, _>>();

        let mut dependencies = BTreeMap::<String, BTreeSet<String>>::new();
        dependencies.insert("app".to_string(), BTreeSet::from(["core".to_string()]));
        dependencies.insert("cli".to_string(), BTreeSet::from(["core".to_string()]));
        dependencies.insert("core".to_string(), BTreeSet::new());

        let mut dependents = BTreeMap::<String, BTreeSet<String>>::new();
        dependents.insert("app".to_string(), BTreeSet::new());
        dependents.insert("cli".to_string(), BTreeSet::new());
        dependents.insert(
            "core".to_string(),
            BTreeSet::from(["app".to_string(), "cli".to_string()]),
        );

        Workspace {
            root,
            packages,
            dependencies,
            dependents,
        }
    }

    #[test]
    fn changed_packages_maps_direct_paths() {
        let workspace = fixture_workspace();
        let paths = BTreeSet::from([PathBuf::from("crates/core/src/lib.rs")]);

        let changed = workspace.changed_packages(&paths, false);

        assert_eq!(changed, BTreeSet::from(["core".to_string()]));
    }

    #[test]
    fn changed_packages_expands_dependents_by_default() {
        let workspace = fixture_workspace();
        let paths = BTreeSet::from([PathBuf::from("crates/core/src/lib.rs")]);

        let changed = workspace.changed_packages(&paths, true);

        assert_eq!(
            changed,
            BTreeSet::from(["app".to_string(), "cli".to_string(), "core".to_string()])
        );
    }

    #[test]
    fn global_impact_file_marks_all_packages_changed() {
        let workspace = fixture_workspace();
        let paths = BTreeSet::from([PathBuf::from("Cargo.toml")]);

        let changed = workspace.changed_packages(&paths, false);

        assert_eq!(
            changed,
            BTreeSet::from(["app".to_string(), "cli".to_string(), "core".to_string()])
        );
    }

    #[test]
    fn topological_order_sorts_dependencies_first() {
        let workspace = fixture_workspace();
        let selected = BTreeSet::from(["app".to_string(), "cli".to_string(), "core".to_string()]);

        let ordered = workspace.topological_order(&selected).unwrap();

        let core_index = ordered.iter().position(|name| name == "core").unwrap();
        let app_index = ordered.iter().position(|name| name == "app").unwrap();
        let cli_index = ordered.iter().position(|name| name == "cli").unwrap();

        assert!(core_index < app_index);
        assert!(core_index < cli_index);
    }

    #[test]
    fn topological_levels_group_core_before_its_dependents() {
        let workspace = fixture_workspace();
        let selected = BTreeSet::from(["app".to_string(), "cli".to_string(), "core".to_string()]);

        let levels = workspace.topological_levels(&selected, true).unwrap();

        assert_eq!(levels[0], vec!["core".to_string()]);
        assert_eq!(
            levels[1].iter().cloned().collect::<BTreeSet<_>>(),
            BTreeSet::from(["app".to_string(), "cli".to_string()])
        );
    }

    #[test]
    fn topological_levels_ignores_dev_edges_unless_include_dev_is_set() {
        let root = PathBuf::from("/repo");
        let packages = [
            ("app", vec![edge("core", DependencyKind::Development)]),
            ("core", vec![]),
        ]
        .into_iter()
        .map(|(name, deps)| (name.to_string(), package(name, &root, deps)))
        .collect::<BTreeMap<_, _>>();

        let mut dependencies = BTreeMap::new();
        dependencies.insert("app".to_string(), BTreeSet::from(["core".to_string()]));
        dependencies.insert("core".to_string(), BTreeSet::new());

        let mut dependents = BTreeMap::new();
        dependents.insert("app".to_string(), BTreeSet::new());
        dependents.insert("core".to_string(), BTreeSet::from(["app".to_string()]));

        let workspace = Workspace {
            root,
            packages,
            dependencies,
            dependents,
        };

        let selected = BTreeSet::from(["app".to_string(), "core".to_string()]);

        let without_dev = workspace.topological_levels(&selected, false).unwrap();
        assert_eq!(without_dev.len(), 1);
        assert_eq!(
            without_dev[0].iter().cloned().collect::<BTreeSet<_>>(),
            selected
        );

        let with_dev = workspace.topological_levels(&selected, true).unwrap();
        assert_eq!(with_dev.len(), 2);
        assert_eq!(with_dev[0], vec!["core".to_string()]);
        assert_eq!(with_dev[1], vec!["app".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let root = PathBuf::from("/repo");
        let mut packages = BTreeMap::new();
        packages.insert(
            "a".to_string(),
            package("a", &root, vec![edge("b", DependencyKind::Runtime)]),
        );
        packages.insert(
            "b".to_string(),
            package("b", &root, vec![edge("a", DependencyKind::Runtime)]),
        );

        let mut dependencies = BTreeMap::new();
        dependencies.insert("a".to_string(), BTreeSet::from(["b".to_string()]));
        dependencies.insert("b".to_string(), BTreeSet::from(["a".to_string()]));

        let mut dependents = BTreeMap::new();
        dependents.insert("a".to_string(), BTreeSet::from(["b".to_string()]));
        dependents.insert("b".to_string(), BTreeSet::from(["a".to_string()]));

        let workspace = Workspace {
            root,
            packages,
            dependencies,
            dependents,
        };

        let selected = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let result = workspace.topological_order(&selected);

        assert!(result.is_err());
    }
}
