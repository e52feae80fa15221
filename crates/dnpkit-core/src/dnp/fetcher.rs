//! The Fetcher contract and an in-memory implementation.
//!
//! A Fetcher turns `(name, spec)` into concrete versions and a concrete
//! version into its manifest. Implementations own retries and timeouts;
//! the aggregator treats every error as "skip this candidate".

use super::error::FetchError;
use super::spec::{DependencyMap, VersionSpec};
use async_trait::async_trait;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One concrete package version as published in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: Version,
    pub dependencies: DependencyMap,
    /// Content hash the version was published under, if known.
    pub origin: Option<String>,
}

/// Source of package metadata.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// All concrete versions of `name` matching `spec`.
    ///
    /// `Latest`, `Exact` and `Origin` specs yield at most one version.
    async fn versions(&self, name: &str, spec: &VersionSpec) -> Result<Vec<Version>, FetchError>;

    /// The manifest of one concrete version.
    async fn manifest(&self, name: &str, version: &Version) -> Result<Manifest, FetchError>;

    /// Resolve `spec` to its highest matching version and fetch that manifest.
    async fn resolve(&self, name: &str, spec: &VersionSpec) -> Result<Manifest, FetchError> {
        let version = self
            .versions(name, spec)
            .await?
            .into_iter()
            .max()
            .ok_or_else(|| FetchError::no_matching_version(name, spec))?;
        self.manifest(name, &version).await
    }
}

/// Pick the versions of one package matching `spec`.
///
/// `published` maps every available version to its origin; `latest` is the
/// registry's latest tag, falling back to the highest version.
///
/// # Errors
/// Returns an error if nothing matches.
pub fn select_versions(
    name: &str,
    spec: &VersionSpec,
    published: &BTreeMap<Version, Option<String>>,
    latest: Option<&Version>,
) -> Result<Vec<Version>, FetchError> {
    let selected: Vec<Version> = match spec {
        VersionSpec::Range(range) => published
            .keys()
            .filter(|v| range.matches(v))
            .cloned()
            .collect(),
        VersionSpec::Exact(exact) => published
            .keys()
            .filter(|v| *v == exact)
            .cloned()
            .collect(),
        VersionSpec::Latest => latest
            .filter(|v| published.contains_key(*v))
            .or_else(|| published.keys().next_back())
            .cloned()
            .into_iter()
            .collect(),
        VersionSpec::Origin(hash) => published
            .iter()
            .filter(|(_, origin)| origin.as_deref() == Some(hash.as_str()))
            .map(|(v, _)| v.clone())
            .take(1)
            .collect(),
    };

    if selected.is_empty() {
        return Err(FetchError::no_matching_version(name, spec));
    }
    Ok(selected)
}

#[derive(Debug, Clone, Default)]
struct MemoryPackage {
    releases: BTreeMap<Version, Manifest>,
    latest: Option<Version>,
}

/// An in-memory registry.
///
/// Useful for embedding a fixed catalogue and for exercising resolution
/// against unreachable content: any package or version can be marked as
/// failing, and every call can be delayed.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    packages: BTreeMap<String, MemoryPackage>,
    failing_packages: BTreeSet<String>,
    failing_manifests: BTreeSet<(String, Version)>,
    delay: Option<Duration>,
    manifest_calls: AtomicUsize,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a version with its dependencies.
    ///
    /// # Panics
    /// Panics if `version` or one of the dependency specs does not parse.
    #[must_use]
    pub fn with_release(mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        self.publish(name, version, deps, None);
        self
    }

    /// Publish a version under a content hash.
    ///
    /// # Panics
    /// Panics if `version` or one of the dependency specs does not parse.
    #[must_use]
    pub fn with_origin_release(
        mut self,
        name: &str,
        version: &str,
        origin: &str,
        deps: &[(&str, &str)],
    ) -> Self {
        self.publish(name, version, deps, Some(origin.to_string()));
        self
    }

    /// Override the latest tag of a package.
    #[must_use]
    pub fn with_latest(mut self, name: &str, version: &str) -> Self {
        self.packages.entry(name.to_string()).or_default().latest = Some(parse_version(version));
        self
    }

    /// Make every call for `name` fail.
    #[must_use]
    pub fn with_failing_package(mut self, name: &str) -> Self {
        self.failing_packages.insert(name.to_string());
        self
    }

    /// Make the manifest of one version fail.
    #[must_use]
    pub fn with_failing_manifest(mut self, name: &str, version: &str) -> Self {
        self.failing_manifests
            .insert((name.to_string(), parse_version(version)));
        self
    }

    /// Delay every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of manifest fetches served or failed so far.
    #[must_use]
    pub fn manifest_calls(&self) -> usize {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    fn publish(
        &mut self,
        name: &str,
        version: &str,
        deps: &[(&str, &str)],
        origin: Option<String>,
    ) {
        let version = parse_version(version);
        // Fixture dependency specs are written by hand; a typo should be loud.
        let dependencies: DependencyMap = deps
            .iter()
            .map(|(dep, spec)| {
                let spec = VersionSpec::parse(spec)
                    .unwrap_or_else(|e| panic!("invalid spec '{spec}' for {dep}: {e}"));
                ((*dep).to_string(), spec)
            })
            .collect();

        self.packages
            .entry(name.to_string())
            .or_default()
            .releases
            .insert(
                version.clone(),
                Manifest {
                    version,
                    dependencies,
                    origin,
                },
            );
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn package(&self, name: &str) -> Result<&MemoryPackage, FetchError> {
        if self.failing_packages.contains(name) {
            return Err(FetchError::Registry(format!("Simulated failure for {name}")));
        }
        self.packages
            .get(name)
            .ok_or_else(|| FetchError::NotFound(name.to_string()))
    }
}

fn parse_version(version: &str) -> Version {
    Version::parse(version).unwrap_or_else(|e| panic!("invalid version '{version}': {e}"))
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn versions(&self, name: &str, spec: &VersionSpec) -> Result<Vec<Version>, FetchError> {
        self.pause().await;
        let package = self.package(name)?;
        let published: BTreeMap<Version, Option<String>> = package
            .releases
            .iter()
            .map(|(v, m)| (v.clone(), m.origin.clone()))
            .collect();
        select_versions(name, spec, &published, package.latest.as_ref())
    }

    async fn manifest(&self, name: &str, version: &Version) -> Result<Manifest, FetchError> {
        self.pause().await;
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        let package = self.package(name)?;
        if self
            .failing_manifests
            .contains(&(name.to_string(), version.clone()))
        {
            return Err(FetchError::invalid_manifest(
                name,
                format!("Simulated failure for {version}"),
            ));
        }
        package
            .releases
            .get(version)
            .cloned()
            .ok_or_else(|| FetchError::no_matching_version(name, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn spec(s: &str) -> VersionSpec {
        VersionSpec::parse(s).unwrap()
    }

    fn fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with_release("k.dnp.dappnode.eth", "0.1.0", &[("dep.dnp.dappnode.eth", "^0.1.1")])
            .with_release("k.dnp.dappnode.eth", "0.1.1", &[("dep.dnp.dappnode.eth", "^0.1.1")])
            .with_origin_release("k.dnp.dappnode.eth", "0.2.0", "/ipfs/QmK020", &[])
    }

    #[tokio::test]
    async fn test_range_returns_all_matching() {
        let versions = fetcher()
            .versions("k.dnp.dappnode.eth", &spec("^0.1.0"))
            .await
            .unwrap();
        assert_eq!(versions, vec![v("0.1.0"), v("0.1.1")]);
    }

    #[tokio::test]
    async fn test_latest_and_exact() {
        let f = fetcher();
        assert_eq!(
            f.versions("k.dnp.dappnode.eth", &VersionSpec::Latest).await.unwrap(),
            vec![v("0.2.0")]
        );
        assert_eq!(
            f.versions("k.dnp.dappnode.eth", &spec("0.1.0")).await.unwrap(),
            vec![v("0.1.0")]
        );
        assert!(f.versions("k.dnp.dappnode.eth", &spec("0.9.0")).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_tag_override() {
        let f = fetcher().with_latest("k.dnp.dappnode.eth", "0.1.1");
        assert_eq!(
            f.versions("k.dnp.dappnode.eth", &VersionSpec::Latest).await.unwrap(),
            vec![v("0.1.1")]
        );
    }

    #[tokio::test]
    async fn test_origin_lookup() {
        let f = fetcher();
        assert_eq!(
            f.versions("k.dnp.dappnode.eth", &spec("/ipfs/QmK020")).await.unwrap(),
            vec![v("0.2.0")]
        );
        assert!(f
            .versions("k.dnp.dappnode.eth", &spec("/ipfs/QmMissing"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resolve_picks_highest() {
        let manifest = fetcher()
            .resolve("k.dnp.dappnode.eth", &spec("^0.1.0"))
            .await
            .unwrap();
        assert_eq!(manifest.version, v("0.1.1"));
        assert!(manifest.dependencies.contains_key("dep.dnp.dappnode.eth"));
    }

    #[tokio::test]
    async fn test_failures() {
        let f = fetcher()
            .with_failing_manifest("k.dnp.dappnode.eth", "0.1.1")
            .with_failing_package("broken.dnp.dappnode.eth");

        assert!(f.manifest("k.dnp.dappnode.eth", &v("0.1.1")).await.is_err());
        assert!(f.manifest("k.dnp.dappnode.eth", &v("0.1.0")).await.is_ok());
        assert!(f
            .versions("broken.dnp.dappnode.eth", &VersionSpec::Latest)
            .await
            .is_err());
        assert!(matches!(
            f.versions("unknown.dnp.dappnode.eth", &VersionSpec::Latest).await,
            Err(FetchError::NotFound(_))
        ));
        assert_eq!(f.manifest_calls(), 2);
    }
}
