//! DNP resolution error types.

use std::fmt;
use std::io;
use thiserror::Error;

/// Stable error codes surfaced by the CLI and JSON output.
pub mod codes {
    pub const DNP_REQUEST_INVALID: &str = "DNP_REQUEST_INVALID";
    pub const DNP_UNSATISFIABLE: &str = "DNP_UNSATISFIABLE";
    pub const DNP_CANCELLED: &str = "DNP_CANCELLED";
    pub const DNP_INSTALLED_STATE_ERROR: &str = "DNP_INSTALLED_STATE_ERROR";

    // Fetch failures never leave the aggregator, but they are traced with a code.
    pub const DNP_NOT_FOUND: &str = "DNP_NOT_FOUND";
    pub const DNP_VERSION_NOT_FOUND: &str = "DNP_VERSION_NOT_FOUND";
    pub const DNP_REGISTRY_ERROR: &str = "DNP_REGISTRY_ERROR";
    pub const DNP_MANIFEST_INVALID: &str = "DNP_MANIFEST_INVALID";
}

/// One requester of a package and the range it imposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Who asked: `name@version` of a dependent, `request`, or `installed`.
    pub requester: String,
    /// The version spec the requester imposed, as written.
    pub range: String,
}

impl Requirement {
    #[must_use]
    pub fn new(requester: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            range: range.into(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.requester, self.range)
    }
}

/// Errors returned to callers of [`resolve_install`](super::resolve_install).
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(
        "No version of {name} satisfies all constraints ({}); available: [{}]",
        join_requirements(.requesters),
        .candidates.join(", ")
    )]
    UnsatisfiableConstraint {
        name: String,
        requesters: Vec<Requirement>,
        candidates: Vec<String>,
    },

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Failed to read installed packages: {0}")]
    InstalledState(String),
}

impl ResolveError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn installed_state(msg: impl Into<String>) -> Self {
        Self::InstalledState(msg.into())
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => codes::DNP_REQUEST_INVALID,
            Self::UnsatisfiableConstraint { .. } => codes::DNP_UNSATISFIABLE,
            Self::Cancelled => codes::DNP_CANCELLED,
            Self::InstalledState(_) => codes::DNP_INSTALLED_STATE_ERROR,
        }
    }
}

fn join_requirements(requesters: &[Requirement]) -> String {
    if requesters.is_empty() {
        return "no requesters".to_string();
    }
    requesters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single failed Fetcher call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("No version of {name} matches {spec}")]
    NoMatchingVersion { name: String, spec: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid manifest for {name}: {message}")]
    InvalidManifest { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    #[must_use]
    pub fn no_matching_version(name: &str, spec: impl fmt::Display) -> Self {
        Self::NoMatchingVersion {
            name: name.to_string(),
            spec: spec.to_string(),
        }
    }

    pub fn invalid_manifest(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            name: name.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => codes::DNP_NOT_FOUND,
            Self::NoMatchingVersion { .. } => codes::DNP_VERSION_NOT_FOUND,
            Self::Registry(_) | Self::Io(_) => codes::DNP_REGISTRY_ERROR,
            Self::InvalidManifest { .. } => codes::DNP_MANIFEST_INVALID,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Registry(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::Registry(format!("Connection failed: {e}"))
        } else {
            Self::Registry(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Registry(format!("Invalid JSON: {e}"))
    }
}
