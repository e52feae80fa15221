//! Install plan construction.

use super::aggregate::Universe;
use super::graph::{strongly_connected_components, NameGraph};
use super::installed::InstalledPackage;
use super::resolve::ResolvedSet;
use super::version::is_older;
use semver::Version;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Package that manages the node itself. Installing it restarts the
/// installer, so it always goes last.
pub const DEFAULT_ORCHESTRATOR: &str = "dappmanager.dnp.dappnode.eth";

/// One step of an install plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlanEntry {
    pub name: String,
    pub target_version: Version,
    /// False when the installed copy is already at the target.
    pub needs_install: bool,
    /// Position in the plan, starting at 0.
    pub order: usize,
}

/// Order the resolved set for installation.
///
/// Dependencies come before their dependents; members of a cycle are sorted
/// by name. The orchestrator, when present, is moved to the end.
#[must_use]
pub fn build_install_plan(
    universe: &Universe,
    resolved: &ResolvedSet,
    installed: &[InstalledPackage],
    orchestrator: &str,
) -> Vec<InstallPlanEntry> {
    let graph: NameGraph<'_> = resolved
        .iter()
        .map(|(name, version)| {
            let deps: BTreeSet<&str> = universe
                .get(name)
                .and_then(|node| node.versions.get(version))
                .into_iter()
                .flat_map(|deps| deps.keys())
                .map(String::as_str)
                .filter(|dep| resolved.contains_key(*dep))
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    // Copies the registry knew nothing about have nothing to install.
    let mut names: Vec<&str> = strongly_connected_components(&graph)
        .into_iter()
        .flatten()
        .filter(|name| !universe.get(*name).is_some_and(|node| node.installed_only))
        .collect();

    if let Some(pos) = names.iter().position(|name| *name == orchestrator) {
        let last = names.remove(pos);
        names.push(last);
    }

    let installed_versions: BTreeMap<&str, &str> = installed
        .iter()
        .map(|pkg| (pkg.name.as_str(), pkg.version.as_str()))
        .collect();

    names
        .into_iter()
        .enumerate()
        .map(|(order, name)| {
            let target_version = resolved[name].clone();
            let needs_install = installed_versions
                .get(name)
                .map_or(true, |current| differs_from_installed(current, &target_version));
            InstallPlanEntry {
                name: name.to_string(),
                target_version,
                needs_install,
                order,
            }
        })
        .collect()
}

/// Whether the running copy has to be replaced to reach `target`.
///
/// A valid installed version must match exactly, so downgrades are
/// installed too. An unparseable one compares as the placeholder and is
/// only replaced when older.
fn differs_from_installed(installed: &str, target: &Version) -> bool {
    match Version::parse(installed.trim()) {
        Ok(current) => current != *target,
        Err(_) => is_older(installed, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnp::spec::{DependencyMap, VersionSpec};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    /// `(name, version, "space separated deps")`
    fn universe(entries: &[(&str, &str, &str)]) -> (Universe, ResolvedSet) {
        let mut universe = Universe::new();
        let mut resolved = ResolvedSet::new();
        for (name, version, deps) in entries {
            let deps: DependencyMap = deps
                .split_whitespace()
                .map(|d| (d.to_string(), VersionSpec::Latest))
                .collect();
            universe
                .entry((*name).to_string())
                .or_default()
                .versions
                .insert(v(version), deps);
            resolved.insert((*name).to_string(), v(version));
        }
        (universe, resolved)
    }

    fn order(plan: &[InstallPlanEntry]) -> Vec<&str> {
        plan.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_first() {
        let (u, r) = universe(&[
            ("app", "1.0.0", "lib"),
            ("lib", "1.0.0", "base"),
            ("base", "1.0.0", ""),
        ]);
        let plan = build_install_plan(&u, &r, &[], DEFAULT_ORCHESTRATOR);
        assert_eq!(order(&plan), vec!["base", "lib", "app"]);
        assert_eq!(
            plan.iter().map(|e| e.order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(plan.iter().all(|e| e.needs_install));
    }

    #[test]
    fn test_cycle_sorted_after_its_dependencies() {
        let (u, r) = universe(&[
            ("web", "0.0.0", "letsencrypt proxy"),
            ("letsencrypt", "0.0.4", "web"),
            ("proxy", "0.1.0", ""),
        ]);
        let plan = build_install_plan(&u, &r, &[], DEFAULT_ORCHESTRATOR);
        assert_eq!(order(&plan), vec!["proxy", "letsencrypt", "web"]);
    }

    #[test]
    fn test_orchestrator_last() {
        let (u, r) = universe(&[
            ("app", "1.0.0", DEFAULT_ORCHESTRATOR),
            (DEFAULT_ORCHESTRATOR, "0.2.0", ""),
            ("zeta", "1.0.0", ""),
        ]);
        let plan = build_install_plan(&u, &r, &[], DEFAULT_ORCHESTRATOR);
        assert_eq!(plan.last().unwrap().name, DEFAULT_ORCHESTRATOR);
        assert_eq!(plan.last().unwrap().order, 2);
    }

    #[test]
    fn test_custom_orchestrator() {
        let (u, r) = universe(&[("boss", "1.0.0", ""), ("app", "1.0.0", "boss")]);
        let plan = build_install_plan(&u, &r, &[], "boss");
        assert_eq!(order(&plan), vec!["app", "boss"]);
    }

    #[test]
    fn test_needs_install() {
        let (u, r) = universe(&[
            ("fresh", "1.0.0", ""),
            ("current", "1.0.0", ""),
            ("stale", "1.2.0", ""),
            ("newer", "1.0.0", ""),
            ("devbuild", "1.0.0", ""),
        ]);
        let installed = vec![
            InstalledPackage::new("current", "1.0.0"),
            InstalledPackage::new("stale", "1.1.0"),
            InstalledPackage::new("newer", "2.0.0"),
            InstalledPackage::new("devbuild", "dev"),
        ];
        let plan = build_install_plan(&u, &r, &installed, DEFAULT_ORCHESTRATOR);
        let needs: BTreeMap<&str, bool> = plan
            .iter()
            .map(|e| (e.name.as_str(), e.needs_install))
            .collect();

        assert!(needs["fresh"]);
        assert!(!needs["current"]);
        assert!(needs["stale"]);
        // Target below the running copy is a downgrade
        assert!(needs["newer"]);
        assert!(!needs["devbuild"]);
    }

    #[test]
    fn test_installed_only_copies_are_not_planned() {
        let (mut u, r) = universe(&[("proxy", "0.1.0", ""), ("web", "999.9.9", "proxy")]);
        u.get_mut("web").unwrap().installed_only = true;
        let installed = vec![InstalledPackage::new("web", "dev")];

        let plan = build_install_plan(&u, &r, &installed, DEFAULT_ORCHESTRATOR);
        assert_eq!(order(&plan), vec!["proxy"]);
        assert_eq!(plan[0].order, 0);
    }

    #[test]
    fn test_empty_resolution() {
        let plan =
            build_install_plan(&Universe::new(), &ResolvedSet::new(), &[], DEFAULT_ORCHESTRATOR);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_serializes_version_as_string() {
        let (u, r) = universe(&[("app", "1.2.3", "")]);
        let plan = build_install_plan(&u, &r, &[], DEFAULT_ORCHESTRATOR);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json[0]["target_version"], "1.2.3");
        assert_eq!(json[0]["needs_install"], true);
    }
}
