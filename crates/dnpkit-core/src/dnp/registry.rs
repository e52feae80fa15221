//! DNP registry client.
//!
//! A registry serves one JSON index per package:
//!
//! ```json
//! {
//!   "name": "nginx-proxy.dnp.dappnode.eth",
//!   "dist-tags": { "latest": "0.1.2" },
//!   "versions": {
//!     "0.1.2": {
//!       "dependencies": { "dependency.dnp.dappnode.eth": "^0.1.1" },
//!       "origin": "/ipfs/Qm..."
//!     }
//!   }
//! }
//! ```
//!
//! Indexes are fetched over HTTP(S) from `<base>/<name>` or read from a
//! local directory as `<dir>/<name>.json`.

use super::error::FetchError;
use super::fetcher::{select_versions, Fetcher, Manifest};
use super::spec::{validate_name, DependencyMap, VersionSpec};
use async_trait::async_trait;
use reqwest::Client;
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Environment variable naming the registry location.
pub const REGISTRY_ENV: &str = "DNPKIT_REGISTRY";

#[derive(Debug, Clone, Default, Deserialize)]
struct DistTags {
    latest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexRelease {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    origin: Option<String>,
}

/// Per-package index document.
#[derive(Debug, Clone, Deserialize)]
struct PackageIndex {
    #[serde(default, rename = "dist-tags")]
    dist_tags: DistTags,
    #[serde(default)]
    versions: BTreeMap<String, IndexRelease>,
}

impl PackageIndex {
    /// Published versions and their origins, skipping keys that are not semver.
    fn published(&self, name: &str) -> BTreeMap<Version, Option<String>> {
        self.versions
            .iter()
            .filter_map(|(raw, release)| match Version::parse(raw) {
                Ok(version) => Some((version, release.origin.clone())),
                Err(e) => {
                    debug!(name, version = %raw, error = %e, "ignoring non-semver release");
                    None
                }
            })
            .collect()
    }

    fn latest(&self) -> Option<Version> {
        self.dist_tags
            .latest
            .as_deref()
            .and_then(|raw| Version::parse(raw).ok())
    }

    fn release(&self, version: &Version) -> Option<&IndexRelease> {
        self.versions
            .iter()
            .find(|(raw, _)| Version::parse(raw).is_ok_and(|v| &v == version))
            .map(|(_, release)| release)
    }
}

#[derive(Debug, Clone)]
enum Source {
    Http { base_url: Url, http: Client },
    Dir(PathBuf),
}

/// Registry client for fetching DNP indexes.
///
/// Each index is fetched once per client and kept in memory.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    source: Source,
    cache: Arc<Mutex<BTreeMap<String, Arc<PackageIndex>>>>,
}

impl RegistryClient {
    /// Create a client for an HTTP(S) registry.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn http(base_url: &str) -> Result<Self, FetchError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| FetchError::Registry(format!("Invalid registry URL '{base_url}': {e}")))?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("dnpkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_source(Source::Http { base_url, http }))
    }

    /// Create a client reading `<dir>/<name>.json` files.
    #[must_use]
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::Dir(dir.into()))
    }

    /// Create a client from a URL or a path relative to `cwd`.
    ///
    /// # Errors
    /// Returns an error if an HTTP location is not a valid URL.
    pub fn from_location(location: &str, cwd: &Path) -> Result<Self, FetchError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Self::http(location);
        }
        Ok(Self::directory(cwd.join(location)))
    }

    /// Create a client from the `DNPKIT_REGISTRY` environment variable.
    ///
    /// # Errors
    /// Returns an error if the variable is unset or invalid.
    pub fn from_env(cwd: &Path) -> Result<Self, FetchError> {
        let location = std::env::var(REGISTRY_ENV)
            .map_err(|_| FetchError::Registry(format!("{REGISTRY_ENV} is not set")))?;
        Self::from_location(&location, cwd)
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            cache: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Human-readable registry location.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.source {
            Source::Http { base_url, .. } => base_url.to_string(),
            Source::Dir(dir) => dir.display().to_string(),
        }
    }

    async fn index(&self, name: &str) -> Result<Arc<PackageIndex>, FetchError> {
        // Names become URL segments and file names.
        validate_name(name).map_err(|e| FetchError::Registry(e.to_string()))?;

        if let Some(index) = self.cache.lock().await.get(name) {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(self.load_index(name).await?);
        self.cache
            .lock()
            .await
            .insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    async fn load_index(&self, name: &str) -> Result<PackageIndex, FetchError> {
        match &self.source {
            Source::Http { base_url, http } => {
                let url = base_url.join(name).map_err(|e| {
                    FetchError::Registry(format!("Failed to build URL for '{name}': {e}"))
                })?;
                debug!(%url, "fetching index");

                let response = http.get(url.as_str()).send().await?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound(name.to_string()));
                }

                if !response.status().is_success() {
                    return Err(FetchError::Registry(format!(
                        "Registry returned status {} for '{name}'",
                        response.status()
                    )));
                }

                Ok(response.json().await?)
            }
            Source::Dir(dir) => {
                let path = dir.join(format!("{name}.json"));
                debug!(path = %path.display(), "reading index");

                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(FetchError::NotFound(name.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                };

                Ok(serde_json::from_str(&content)?)
            }
        }
    }
}

#[async_trait]
impl Fetcher for RegistryClient {
    async fn versions(&self, name: &str, spec: &VersionSpec) -> Result<Vec<Version>, FetchError> {
        let index = self.index(name).await?;
        let latest = index.latest();
        select_versions(name, spec, &index.published(name), latest.as_ref())
    }

    async fn manifest(&self, name: &str, version: &Version) -> Result<Manifest, FetchError> {
        let index = self.index(name).await?;
        let release = index
            .release(version)
            .ok_or_else(|| FetchError::no_matching_version(name, version))?;

        let mut dependencies = DependencyMap::new();
        for (dep, raw) in &release.dependencies {
            validate_name(dep).map_err(|e| {
                FetchError::invalid_manifest(name, format!("{version}: dependency {e}"))
            })?;
            let spec = VersionSpec::parse(raw).map_err(|e| {
                FetchError::invalid_manifest(name, format!("{version}: dependency {dep}: {e}"))
            })?;
            dependencies.insert(dep.clone(), spec);
        }

        Ok(Manifest {
            version: version.clone(),
            dependencies,
            origin: release.origin.clone(),
        })
    }
}
