//! Dependency graph aggregation.
//!
//! Walks the request and the relevant installed packages through the
//! Fetcher and records every candidate version reachable from them.
//! Fetches run concurrently; their results are merged by the single
//! driver loop that owns the [`Universe`], so the "already claimed" check
//! never races.

use super::error::{FetchError, ResolveError};
use super::fetcher::{Fetcher, Manifest};
use super::installed::InstalledPackage;
use super::spec::{DependencyMap, DnpRequest, VersionSpec};
use super::version::{installed_version_or_placeholder, VersionRange};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything learned about one package name during aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphNode {
    /// Candidate versions and their declared dependencies.
    pub versions: BTreeMap<Version, DependencyMap>,
    /// The package is the target of the request.
    pub is_request: bool,
    /// The package is installed and affected by the request.
    pub is_installed: bool,
    /// Spec the user requested, for the request node.
    pub request_spec: Option<VersionSpec>,
    /// Spec the installed copy was re-validated with.
    pub installed_spec: Option<VersionSpec>,
    /// Installed version string, for any installed package in the universe.
    pub installed_version: Option<String>,
    /// Version each origin pin resolved to.
    pub origins: BTreeMap<String, Version>,
    /// Highest version a `latest` lookup returned.
    pub latest: Option<Version>,
    /// The registry had nothing for this installed package; its only
    /// candidate is the running copy with its declared dependencies.
    pub installed_only: bool,
}

impl GraphNode {
    /// Dependencies of every candidate, by name.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.versions
            .values()
            .flat_map(|deps| deps.keys().map(String::as_str))
    }
}

/// Aggregation result: package name to node.
pub type Universe = BTreeMap<String, GraphNode>;

/// A `(name, spec)` pair waiting to be fetched.
#[derive(Debug, Clone)]
struct PendingDep {
    name: String,
    spec: VersionSpec,
}

enum Outcome {
    Versions(PendingDep, Result<Vec<Version>, FetchError>),
    Manifest(String, Version, Result<Manifest, FetchError>),
}

/// Counters reported when aggregation completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub lookups: usize,
    pub manifests: usize,
    pub skipped: usize,
}

/// Build the universe for `request`.
///
/// Failed lookups are skipped, never fatal: a package may end up with no
/// candidates, which the resolver reports. At most `max_concurrent` Fetcher
/// calls are in flight at once.
///
/// # Errors
/// Returns [`ResolveError::Cancelled`] if `cancel` fires first; in-flight
/// fetches are dropped.
pub async fn aggregate(
    request: &DnpRequest,
    relevant_installed: &[InstalledPackage],
    fetcher: &dyn Fetcher,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> Result<(Universe, AggregateStats), ResolveError> {
    let max_concurrent = max_concurrent.max(1);
    let mut universe = Universe::new();
    let mut stats = AggregateStats::default();
    let mut queue: VecDeque<PendingDep> = VecDeque::new();
    let mut seen_specs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut claimed: BTreeSet<(String, Version)> = BTreeSet::new();
    // Installed dependents whose declared dependencies are not walked yet.
    let mut unexpanded: BTreeMap<&str, &InstalledPackage> = relevant_installed
        .iter()
        .filter(|pkg| pkg.name != request.name)
        .map(|pkg| (pkg.name.as_str(), pkg))
        .collect();

    for pkg in relevant_installed {
        let node = universe.entry(pkg.name.clone()).or_default();
        node.is_installed = true;
        node.installed_version = Some(pkg.version.clone());

        let spec = if let Some(origin) = pkg.pinned_origin() {
            VersionSpec::Origin(origin.to_string())
        } else if let Ok(version) = Version::parse(&pkg.version) {
            VersionSpec::Range(VersionRange::at_least(&version))
        } else {
            debug!(
                name = %pkg.name,
                version = %pkg.version,
                "installed version is not semver, walking its declared dependencies"
            );
            if unexpanded.remove(pkg.name.as_str()).is_some() {
                enqueue_dependencies(&mut universe, &mut queue, &pkg.dependencies);
            }
            continue;
        };
        node.installed_spec = Some(spec.clone());
        queue.push_back(PendingDep {
            name: pkg.name.clone(),
            spec,
        });
    }

    let node = universe.entry(request.name.clone()).or_default();
    node.is_request = true;
    node.request_spec = Some(request.spec.clone());
    queue.push_front(PendingDep {
        name: request.name.clone(),
        spec: request.spec.clone(),
    });

    let mut in_flight: FuturesUnordered<BoxFuture<'_, Outcome>> = FuturesUnordered::new();

    loop {
        while in_flight.len() < max_concurrent {
            let Some(dep) = queue.pop_front() else {
                break;
            };
            if !seen_specs.insert((dep.name.clone(), dep.spec.to_string())) {
                continue;
            }
            stats.lookups += 1;
            in_flight.push(
                async move {
                    let result = fetcher.versions(&dep.name, &dep.spec).await;
                    Outcome::Versions(dep, result)
                }
                .boxed(),
            );
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ResolveError::Cancelled),
            next = in_flight.next() => match next {
                Some(outcome) => outcome,
                None => break,
            },
        };

        match outcome {
            Outcome::Versions(dep, Ok(versions)) => {
                let node = universe.entry(dep.name.clone()).or_default();
                match &dep.spec {
                    VersionSpec::Origin(hash) => {
                        if let Some(version) = versions.first() {
                            node.origins.insert(hash.clone(), version.clone());
                        }
                    }
                    VersionSpec::Latest => {
                        let newest = versions.iter().max().cloned();
                        node.latest = node.latest.take().max(newest);
                    }
                    VersionSpec::Range(_) | VersionSpec::Exact(_) => {}
                }

                for version in versions {
                    if !claimed.insert((dep.name.clone(), version.clone())) {
                        continue;
                    }
                    stats.manifests += 1;
                    let name = dep.name.clone();
                    in_flight.push(
                        async move {
                            let result = fetcher.manifest(&name, &version).await;
                            Outcome::Manifest(name, version, result)
                        }
                        .boxed(),
                    );
                }
            }
            Outcome::Versions(dep, Err(e)) => {
                stats.skipped += 1;
                warn!(
                    name = %dep.name,
                    spec = %dep.spec,
                    code = e.code(),
                    error = %e,
                    "skipping unresolvable dependency"
                );
                if let Some(pkg) = unexpanded.remove(dep.name.as_str()) {
                    enqueue_dependencies(&mut universe, &mut queue, &pkg.dependencies);
                }
            }
            Outcome::Manifest(name, version, Ok(manifest)) => {
                debug!(%name, %version, deps = manifest.dependencies.len(), "fetched manifest");
                enqueue_dependencies(&mut universe, &mut queue, &manifest.dependencies);
                universe
                    .entry(name)
                    .or_default()
                    .versions
                    .insert(version, manifest.dependencies);
            }
            Outcome::Manifest(name, version, Err(e)) => {
                stats.skipped += 1;
                warn!(
                    %name,
                    %version,
                    code = e.code(),
                    error = %e,
                    "skipping candidate whose manifest could not be fetched"
                );
            }
        }
    }

    keep_unfetched_installed(&mut universe, request, relevant_installed);

    info!(
        packages = universe.len(),
        lookups = stats.lookups,
        manifests = stats.manifests,
        skipped = stats.skipped,
        "aggregated dependency graph"
    );

    Ok((universe, stats))
}

fn enqueue_dependencies(
    universe: &mut Universe,
    queue: &mut VecDeque<PendingDep>,
    deps: &DependencyMap,
) {
    for (name, spec) in deps {
        universe.entry(name.clone()).or_default();
        queue.push_back(PendingDep {
            name: name.clone(),
            spec: spec.clone(),
        });
    }
}

/// Give relevant installed packages without candidates their running copy.
///
/// The copy keeps imposing the dependencies it declares. A version that is
/// not semver becomes the placeholder.
fn keep_unfetched_installed(
    universe: &mut Universe,
    request: &DnpRequest,
    relevant_installed: &[InstalledPackage],
) {
    for pkg in relevant_installed {
        if pkg.name == request.name {
            continue;
        }
        let Some(node) = universe.get_mut(&pkg.name) else {
            continue;
        };
        if !node.versions.is_empty() {
            continue;
        }
        debug!(
            name = %pkg.name,
            version = %pkg.version,
            "keeping installed copy as the only candidate"
        );
        node.installed_only = true;
        node.versions.insert(
            installed_version_or_placeholder(&pkg.version),
            pkg.dependencies.clone(),
        );
    }
}

/// Record the installed version of every package in the universe.
///
/// Aggregation only tags the relevant installed packages; the resolver also
/// needs to know installed versions of plain dependencies to avoid
/// replacing them needlessly.
pub fn annotate_installed(universe: &mut Universe, installed: &[InstalledPackage]) {
    for pkg in installed {
        if let Some(node) = universe.get_mut(&pkg.name) {
            node.installed_version
                .get_or_insert_with(|| pkg.version.clone());
        }
    }
}
