//! Installed packages and the relevant-installed selector.

use super::error::ResolveError;
use super::spec::DependencyMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

/// A package currently running on the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    /// Installed version. Not necessarily valid semver (`dev` builds exist).
    pub version: String,
    /// Content hash the package was installed from, if pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub dependencies: DependencyMap,
}

impl InstalledPackage {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            origin: None,
            dependencies: DependencyMap::new(),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DependencyMap) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Origin, ignoring empty strings.
    #[must_use]
    pub fn pinned_origin(&self) -> Option<&str> {
        self.origin.as_deref().filter(|o| !o.is_empty())
    }
}

/// Source of the installed-package snapshot.
#[async_trait]
pub trait InstalledStateProvider: Send + Sync {
    /// Point-in-time list of installed packages.
    async fn list(&self) -> Result<Vec<InstalledPackage>, ResolveError>;
}

/// A fixed snapshot, loaded from memory or a JSON file.
#[derive(Debug, Clone, Default)]
pub struct InstalledSnapshot {
    packages: Vec<InstalledPackage>,
}

impl InstalledSnapshot {
    #[must_use]
    pub fn new(packages: Vec<InstalledPackage>) -> Self {
        Self { packages }
    }

    /// Load a JSON array of installed packages.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ResolveError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::installed_state(format!("Failed to read {}: {e}", path.display()))
        })?;
        let packages: Vec<InstalledPackage> = serde_json::from_str(&content).map_err(|e| {
            ResolveError::installed_state(format!("Invalid JSON in {}: {e}", path.display()))
        })?;
        Ok(Self { packages })
    }

    #[must_use]
    pub fn packages(&self) -> &[InstalledPackage] {
        &self.packages
    }
}

#[async_trait]
impl InstalledStateProvider for InstalledSnapshot {
    async fn list(&self) -> Result<Vec<InstalledPackage>, ResolveError> {
        Ok(self.packages.clone())
    }
}

/// Select the installed packages whose dependency chain reaches `requested`.
///
/// Walks the installed declarations backwards from `requested`: a package is
/// relevant if it is `requested` itself or depends, directly or through other
/// installed packages, on a relevant package. Input order is preserved.
#[must_use]
pub fn select_relevant_installed(
    requested: &str,
    installed: &[InstalledPackage],
) -> Vec<InstalledPackage> {
    // dependency name -> installed dependents
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for pkg in installed {
        for dep in pkg.dependencies.keys() {
            dependents.entry(dep.as_str()).or_default().push(pkg.name.as_str());
        }
    }

    let mut reached: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([requested]);
    reached.insert(requested);

    while let Some(name) = queue.pop_front() {
        for &dependent in dependents.get(name).into_iter().flatten() {
            if reached.insert(dependent) {
                queue.push_back(dependent);
            }
        }
    }

    installed
        .iter()
        .filter(|pkg| reached.contains(pkg.name.as_str()))
        .cloned()
        .collect()
}
