//! Version specs and install requests.
//!
//! Parses request strings like:
//! - `bitcoin.dnp.dappnode.eth`
//! - `bitcoin.dnp.dappnode.eth@0.2.5`
//! - `bitcoin.dnp.dappnode.eth@^0.2.0`
//! - `bitcoin.dnp.dappnode.eth@latest`
//! - `bitcoin.dnp.dappnode.eth@/ipfs/QmXyz...`

use super::error::ResolveError;
use super::version::VersionRange;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix every content hash (origin) carries.
pub const CONTENT_HASH_PREFIX: &str = "/ipfs/";

/// Literal used for the `Latest` spec.
pub const LATEST: &str = "latest";

/// A dependency requirement or request target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionSpec {
    Range(VersionRange),
    Exact(Version),
    Latest,
    Origin(String),
}

/// Requirements declared by one package version.
pub type DependencyMap = BTreeMap<String, VersionSpec>;

impl VersionSpec {
    /// Parse a spec string.
    ///
    /// # Errors
    /// Returns an error if the string is neither `latest`, a content hash,
    /// an exact version nor a valid range.
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ResolveError::invalid_request("Empty version spec"));
        }

        if input == LATEST {
            return Ok(Self::Latest);
        }

        if input.starts_with(CONTENT_HASH_PREFIX) || input.starts_with("ipfs/") {
            return validate_content_hash(input).map(Self::Origin);
        }

        if let Ok(exact) = Version::parse(input) {
            return Ok(Self::Exact(exact));
        }

        VersionRange::parse(input).map(Self::Range)
    }

    /// Whether this spec pins immutable content.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Origin(_))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(range) => write!(f, "{range}"),
            Self::Exact(version) => write!(f, "{version}"),
            Self::Latest => f.write_str(LATEST),
            Self::Origin(hash) => f.write_str(hash),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionSpec {
    type Error = ResolveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionSpec> for String {
    fn from(spec: VersionSpec) -> Self {
        spec.to_string()
    }
}

/// Normalize and validate a content hash, returning it with the `/ipfs/` prefix.
///
/// # Errors
/// Returns an error if the hash body is empty or contains non-alphanumeric characters.
pub fn validate_content_hash(input: &str) -> Result<String, ResolveError> {
    let body = input
        .strip_prefix(CONTENT_HASH_PREFIX)
        .or_else(|| input.strip_prefix("ipfs/"))
        .ok_or_else(|| {
            ResolveError::invalid_request(format!("Content hash must start with /ipfs/: '{input}'"))
        })?;

    if body.is_empty() {
        return Err(ResolveError::invalid_request(format!(
            "Empty content hash in '{input}'"
        )));
    }

    if !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ResolveError::invalid_request(format!(
            "Invalid content hash '{input}'"
        )));
    }

    Ok(format!("{CONTENT_HASH_PREFIX}{body}"))
}

/// Validate a package name.
///
/// Names are domain-style: lowercase ASCII alphanumerics, `-` and `_`,
/// separated by non-empty `.` labels.
///
/// # Errors
/// Returns an error describing the first problem found.
pub fn validate_name(name: &str) -> Result<(), ResolveError> {
    if name.is_empty() {
        return Err(ResolveError::invalid_request("Empty package name"));
    }

    for c in name.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.') {
            return Err(ResolveError::invalid_request(format!(
                "Invalid character '{c}' in package name '{name}'"
            )));
        }
    }

    if name.split('.').any(str::is_empty) {
        return Err(ResolveError::invalid_request(format!(
            "Empty label in package name '{name}'"
        )));
    }

    Ok(())
}

/// A top-level install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnpRequest {
    pub name: String,
    pub spec: VersionSpec,
}

impl DnpRequest {
    /// Create a request, validating the name.
    ///
    /// # Errors
    /// Returns an error if the name is malformed.
    pub fn new(name: impl Into<String>, spec: VersionSpec) -> Result<Self, ResolveError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, spec })
    }

    /// Parse `name[@spec]`. A missing spec means `latest`.
    ///
    /// # Errors
    /// Returns an error if the name or spec is malformed.
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ResolveError::invalid_request("Empty request"));
        }

        match input.split_once('@') {
            Some((name, spec)) => {
                if spec.trim().is_empty() {
                    return Err(ResolveError::invalid_request(format!(
                        "Empty version spec in '{input}'"
                    )));
                }
                Self::new(name, VersionSpec::parse(spec)?)
            }
            None => Self::new(input, VersionSpec::Latest),
        }
    }
}

impl fmt::Display for DnpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latest() {
        assert_eq!(VersionSpec::parse("latest").unwrap(), VersionSpec::Latest);
    }

    #[test]
    fn test_parse_exact() {
        assert_eq!(
            VersionSpec::parse("0.2.5").unwrap(),
            VersionSpec::Exact(Version::new(0, 2, 5))
        );
    }

    #[test]
    fn test_parse_range() {
        let spec = VersionSpec::parse("^0.1.0").unwrap();
        assert!(matches!(spec, VersionSpec::Range(_)));
        assert_eq!(spec.to_string(), "^0.1.0");
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(
            VersionSpec::parse("/ipfs/Qm1234").unwrap(),
            VersionSpec::Origin("/ipfs/Qm1234".to_string())
        );
        // Prefix without the leading slash is normalized
        assert_eq!(
            VersionSpec::parse("ipfs/Qm1234").unwrap(),
            VersionSpec::Origin("/ipfs/Qm1234".to_string())
        );
        assert!(VersionSpec::parse("/ipfs/").is_err());
        assert!(VersionSpec::parse("/ipfs/Qm 12").is_err());
    }

    #[test]
    fn test_parse_invalid_spec() {
        assert!(VersionSpec::parse("").is_err());
        assert!(VersionSpec::parse("not-a-range!!!").is_err());
    }

    #[test]
    fn test_spec_serde_as_string() {
        let deps: DependencyMap = serde_json::from_str(
            r#"{"a.dnp.dappnode.eth": "^0.1.0", "b.dnp.dappnode.eth": "latest"}"#,
        )
        .unwrap();
        assert_eq!(deps["b.dnp.dappnode.eth"], VersionSpec::Latest);

        let json = serde_json::to_string(&deps).unwrap();
        assert_eq!(
            json,
            r#"{"a.dnp.dappnode.eth":"^0.1.0","b.dnp.dappnode.eth":"latest"}"#
        );
    }

    #[test]
    fn test_spec_serde_rejects_garbage() {
        let result: Result<DependencyMap, _> = serde_json::from_str(r#"{"a": "???"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("nginx-proxy.dnp.dappnode.eth").is_ok());
        assert!(validate_name("vpn").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Nginx.dnp.dappnode.eth").is_err());
        assert!(validate_name("nginx..eth").is_err());
        assert!(validate_name(".eth").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[test]
    fn test_request_parse() {
        let req = DnpRequest::parse("nginx-proxy.dnp.dappnode.eth@^0.1.0").unwrap();
        assert_eq!(req.name, "nginx-proxy.dnp.dappnode.eth");
        assert_eq!(req.spec.to_string(), "^0.1.0");

        let req = DnpRequest::parse("vpn.dnp.dappnode.eth").unwrap();
        assert_eq!(req.spec, VersionSpec::Latest);

        let req = DnpRequest::parse("vpn.dnp.dappnode.eth@/ipfs/QmAbc").unwrap();
        assert!(req.spec.is_origin());
        assert_eq!(req.to_string(), "vpn.dnp.dappnode.eth@/ipfs/QmAbc");
    }

    #[test]
    fn test_request_parse_invalid() {
        assert!(DnpRequest::parse("").is_err());
        assert!(DnpRequest::parse("vpn.dnp.dappnode.eth@").is_err());
        assert!(DnpRequest::parse("@^1.0.0").is_err());
        assert!(DnpRequest::parse("VPN@1.0.0").is_err());
        assert!(DnpRequest::parse("vpn@/ipfs/").is_err());
    }
}
