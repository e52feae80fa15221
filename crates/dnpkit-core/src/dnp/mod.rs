//! DNP dependency resolution.
//!
//! Provides:
//! - Parsing install requests and version specs (name@spec)
//! - Selecting the installed packages a request affects
//! - Aggregating candidate versions through a [`Fetcher`]
//! - Resolving one version per package with bounded backtracking
//! - Ordering the result into an install plan
//! - Fetching package indexes from an HTTP or directory registry

pub mod aggregate;
pub mod error;
pub mod fetcher;
pub mod graph;
pub mod install;
pub mod installed;
pub mod plan;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod version;

pub use aggregate::{aggregate, annotate_installed, AggregateStats, GraphNode, Universe};
pub use error::{codes, FetchError, Requirement, ResolveError};
pub use fetcher::{select_versions, Fetcher, Manifest, MemoryFetcher};
pub use install::resolve_install;
pub use installed::{
    select_relevant_installed, InstalledPackage, InstalledSnapshot, InstalledStateProvider,
};
pub use plan::{build_install_plan, InstallPlanEntry, DEFAULT_ORCHESTRATOR};
pub use registry::{RegistryClient, REGISTRY_ENV};
pub use resolve::{resolve_versions, satisfies, ResolvedSet, DEFAULT_MAX_RESOLVE_STEPS};
pub use spec::{DependencyMap, DnpRequest, VersionSpec};
pub use version::{is_older, VersionRange, INVALID_VERSION_PLACEHOLDER};
