//! Version resolution over an aggregated [`Universe`].
//!
//! Picks one version per needed package by depth-first search with
//! backtracking. Names are visited dependents-first (cycles as one unit), so
//! every range a package is subject to is known by the time it is chosen.

use super::aggregate::{GraphNode, Universe};
use super::error::{Requirement, ResolveError};
use super::graph::{is_cyclic, strongly_connected_components, NameGraph};
use super::spec::VersionSpec;
use super::version::INVALID_VERSION_PLACEHOLDER;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};

/// Chosen version per package name.
pub type ResolvedSet = BTreeMap<String, Version>;

/// Default bound on search steps.
pub const DEFAULT_MAX_RESOLVE_STEPS: usize = 100_000;

const REQUEST_REQUESTER: &str = "request";
const INSTALLED_REQUESTER: &str = "installed";

/// Check whether `version` of `node` satisfies `spec`.
///
/// `from_request` selects the root semantics of `latest`: on a dependency
/// edge it accepts anything, for the request itself it means the version the
/// registry tagged as latest.
#[must_use]
pub fn satisfies(
    node: &GraphNode,
    spec: &VersionSpec,
    version: &Version,
    from_request: bool,
) -> bool {
    // A running build without a semver version is taken as it is.
    if node.installed_only && *version == INVALID_VERSION_PLACEHOLDER {
        return true;
    }
    match spec {
        VersionSpec::Range(range) => range.matches(version),
        VersionSpec::Exact(exact) => exact == version,
        VersionSpec::Latest if from_request => node.latest.as_ref().map_or(true, |l| l == version),
        VersionSpec::Latest => true,
        VersionSpec::Origin(hash) => node.origins.get(hash) == Some(version),
    }
}

/// Choose one version per needed package.
///
/// Root requirements come from the universe tags: the request node must
/// satisfy the requested spec, relevant installed packages must satisfy the
/// spec they were re-validated with. Packages nothing needs are left out.
///
/// # Errors
/// Returns [`ResolveError::UnsatisfiableConstraint`] for the deepest conflict
/// found once the search is exhausted or `max_steps` is spent.
pub fn resolve_versions(
    universe: &Universe,
    max_steps: usize,
) -> Result<ResolvedSet, ResolveError> {
    let (order, cyclic) = resolution_order(universe);
    debug!(names = order.len(), cyclic = cyclic.len(), "resolution order computed");

    let mut search = Search {
        universe,
        order: &order,
        cyclic: &cyclic,
        decided: BTreeMap::new(),
        steps: 0,
        max_steps,
        exhausted: false,
        deepest: None,
    };

    if search.run() {
        let steps = search.steps;
        let resolved = search.into_resolved();
        info!(resolved = resolved.len(), steps, "resolved versions");
        return Ok(resolved);
    }

    if search.exhausted {
        warn!(max_steps, "resolution step budget exhausted");
    }
    Err(search.into_conflict())
}

/// Visit order and the set of names that sit on a dependency cycle.
fn resolution_order(universe: &Universe) -> (Vec<&str>, BTreeSet<&str>) {
    let graph: NameGraph<'_> = universe
        .iter()
        .map(|(name, node)| {
            let deps = node
                .dependency_names()
                .filter(|dep| universe.contains_key(*dep))
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    let mut cyclic = BTreeSet::new();

    // Components come dependencies-first; walk them backwards.
    for mut component in strongly_connected_components(&graph).into_iter().rev() {
        if is_cyclic(&graph, &component) {
            cyclic.extend(component.iter().copied());
        }
        component.sort_by_key(|name| {
            let node = &universe[*name];
            (!(node.is_request || node.is_installed), *name)
        });
        order.extend(component);
    }

    (order, cyclic)
}

/// A range some requester imposes on the name being decided.
struct Constraint<'u> {
    requester: String,
    spec: &'u VersionSpec,
    from_request: bool,
    /// Imposed by a chosen package rather than a root.
    dependent: bool,
}

impl Constraint<'_> {
    fn to_requirement(&self) -> Requirement {
        Requirement::new(self.requester.clone(), self.spec.to_string())
    }
}

struct Conflict {
    depth: usize,
    name: String,
    requesters: Vec<Requirement>,
    candidates: Vec<String>,
}

struct Search<'u> {
    universe: &'u Universe,
    order: &'u [&'u str],
    cyclic: &'u BTreeSet<&'u str>,
    /// `None` marks a name left out of the result.
    decided: BTreeMap<&'u str, Option<&'u Version>>,
    steps: usize,
    max_steps: usize,
    exhausted: bool,
    deepest: Option<Conflict>,
}

/// One name on the search stack and the choices left for it.
struct Frame<'u> {
    name: &'u str,
    /// `None` leaves the name out.
    choices: Vec<Option<&'u Version>>,
    next: usize,
}

impl<'u> Search<'u> {
    /// Depth-first search over `order` with an explicit stack of frames.
    fn run(&mut self) -> bool {
        let mut frames: Vec<Frame<'u>> = Vec::with_capacity(self.order.len());

        loop {
            let depth = frames.len();
            if depth == self.order.len() {
                return true;
            }
            frames.push(self.enter(depth));

            // Advance the innermost frame that still has a choice left.
            loop {
                let Some(frame) = frames.last_mut() else {
                    return false;
                };
                self.decided.remove(frame.name);

                let Some(&choice) = frame.choices.get(frame.next) else {
                    frames.pop();
                    continue;
                };
                frame.next += 1;

                self.steps += 1;
                if self.steps > self.max_steps {
                    self.exhausted = true;
                    return false;
                }
                self.decided.insert(frame.name, choice);
                break;
            }
        }
    }

    /// Choices for the name at `depth`, given everything decided above it.
    fn enter(&mut self, depth: usize) -> Frame<'u> {
        let name = self.order[depth];
        let universe = self.universe;
        let node = &universe[name];
        let constraints = self.constraints(name, node);

        let has_dependents = constraints.iter().any(|c| c.dependent);
        let is_root = node.is_request || node.is_installed;
        let needed = is_root || has_dependents;

        if !needed && !self.cyclic.contains(name) {
            return Frame {
                name,
                choices: vec![None],
                next: 0,
            };
        }

        let mut choices: Vec<Option<&'u Version>> = self
            .ordered_candidates(node, &constraints)
            .into_iter()
            .filter(|v| self.edges_hold(node, v))
            .map(Some)
            .collect();

        if needed && choices.is_empty() {
            self.record_conflict(depth, name, node, &constraints);
        }
        if !needed {
            // Cycle members nothing needs yet try their candidates first.
            choices.push(None);
        }

        Frame {
            name,
            choices,
            next: 0,
        }
    }

    /// Ranges imposed on `name` by the roots and by already-chosen dependents.
    fn constraints(&self, name: &str, node: &'u GraphNode) -> Vec<Constraint<'u>> {
        let mut constraints = Vec::new();

        if node.is_request {
            if let Some(spec) = &node.request_spec {
                constraints.push(Constraint {
                    requester: REQUEST_REQUESTER.to_string(),
                    spec,
                    from_request: true,
                    dependent: false,
                });
            }
        } else if node.is_installed {
            if let Some(spec) = &node.installed_spec {
                constraints.push(Constraint {
                    requester: INSTALLED_REQUESTER.to_string(),
                    spec,
                    from_request: false,
                    dependent: false,
                });
            }
        }

        let universe = self.universe;
        for (&dependent, &choice) in &self.decided {
            let Some(version) = choice else {
                continue;
            };
            let deps = &universe[dependent].versions[version];
            if let Some(spec) = deps.get(name) {
                constraints.push(Constraint {
                    requester: format!("{dependent}@{version}"),
                    spec,
                    from_request: false,
                    dependent: true,
                });
            }
        }

        constraints
    }

    /// Candidates satisfying every constraint, most preferred first.
    fn ordered_candidates(
        &self,
        node: &'u GraphNode,
        constraints: &[Constraint<'u>],
    ) -> Vec<&'u Version> {
        let mut candidates: Vec<&'u Version> = node
            .versions
            .keys()
            .rev()
            .filter(|v| {
                constraints
                    .iter()
                    .all(|c| satisfies(node, c.spec, v, c.from_request))
            })
            .collect();

        if !node.is_request {
            let installed = node
                .installed_version
                .as_deref()
                .and_then(|s| Version::parse(s.trim()).ok());
            if let Some(installed) = installed {
                if let Some(pos) = candidates.iter().position(|v| **v == installed) {
                    let preferred = candidates.remove(pos);
                    candidates.insert(0, preferred);
                }
            }
        }

        candidates
    }

    /// Whether the candidate's own edges accept what is already decided.
    fn edges_hold(&self, node: &GraphNode, version: &Version) -> bool {
        node.versions[version].iter().all(|(dep, spec)| {
            match self.decided.get(dep.as_str()) {
                None => true,
                Some(None) => false,
                Some(Some(chosen)) => {
                    satisfies(&self.universe[dep.as_str()], spec, chosen, false)
                }
            }
        })
    }

    fn record_conflict(
        &mut self,
        depth: usize,
        name: &str,
        node: &GraphNode,
        constraints: &[Constraint<'_>],
    ) {
        if self.deepest.as_ref().is_some_and(|c| c.depth >= depth) {
            return;
        }
        debug!(name, depth, "no viable candidate");
        self.deepest = Some(Conflict {
            depth,
            name: name.to_string(),
            requesters: constraints.iter().map(Constraint::to_requirement).collect(),
            candidates: node.versions.keys().map(ToString::to_string).collect(),
        });
    }

    fn into_conflict(self) -> ResolveError {
        let conflict = self.deepest.unwrap_or_else(|| {
            // Budget ran out before any name failed outright.
            let name = self
                .universe
                .iter()
                .find(|(_, node)| node.is_request)
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            let candidates = self
                .universe
                .get(&name)
                .map(|node| node.versions.keys().map(ToString::to_string).collect())
                .unwrap_or_default();
            Conflict {
                depth: 0,
                name,
                requesters: Vec::new(),
                candidates,
            }
        });

        ResolveError::UnsatisfiableConstraint {
            name: conflict.name,
            requesters: conflict.requesters,
            candidates: conflict.candidates,
        }
    }

    /// Chosen versions reachable from the roots.
    ///
    /// A cycle member picked speculatively may end up unreferenced once the
    /// rest of its cycle settles; it is dropped here.
    fn into_resolved(self) -> ResolvedSet {
        let chosen: BTreeMap<&str, &Version> = self
            .decided
            .iter()
            .filter_map(|(name, choice)| choice.map(|v| (*name, v)))
            .collect();

        let mut reached: BTreeSet<&str> = chosen
            .keys()
            .copied()
            .filter(|name| {
                let node = &self.universe[*name];
                node.is_request || node.is_installed
            })
            .collect();
        let mut queue: VecDeque<&str> = reached.iter().copied().collect();

        while let Some(name) = queue.pop_front() {
            let deps = &self.universe[name].versions[chosen[name]];
            for dep in deps.keys() {
                let dep = dep.as_str();
                if chosen.contains_key(dep) && reached.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        chosen
            .into_iter()
            .filter(|(name, _)| reached.contains(name))
            .map(|(name, version)| (name.to_string(), version.clone()))
            .collect()
    }
}
