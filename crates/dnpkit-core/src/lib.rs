#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod dnp;
pub mod error;
pub mod version;

pub use config::{Config, ResolveOptions};
pub use dnp::{
    resolve_install, DnpRequest, Fetcher, InstallPlanEntry, InstalledPackage, InstalledSnapshot,
    InstalledStateProvider, RegistryClient, ResolveError, VersionSpec,
};
pub use error::Error;
pub use version::VERSION;
