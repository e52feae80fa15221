//! Semver helpers: npm-style range parsing and installed-version comparison.

use super::error::ResolveError;
use semver::{Version, VersionReq};
use std::cmp::Ordering;
use std::fmt;

/// Version assumed for an installed package whose version string does not
/// parse. It sorts above every real release, so such a package is never
/// considered older than a candidate.
pub const INVALID_VERSION_PLACEHOLDER: Version = Version::new(999, 9, 9);

/// A parsed version range.
///
/// Accepts the syntax DNP manifests use in practice:
/// - Standard semver ranges: `^1.0.0`, `~1.0.0`, `>=1.0.0`
/// - OR ranges: `^1.0.0 || ^2.0.0`
/// - Hyphen ranges: `1.0.0 - 2.0.0`
/// - X-ranges: `1.x`, `1.0.x`, `*`
/// - Space-separated comparators: `>= 2.1.2 < 3.0.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse a range expression.
    ///
    /// # Errors
    /// Returns an error if no alternative of the range parses.
    pub fn parse(range: &str) -> Result<Self, ResolveError> {
        let raw = range.trim();
        if raw.is_empty() {
            return Err(ResolveError::invalid_request("Empty version range"));
        }

        let alternatives = if raw.contains("||") {
            let reqs: Vec<VersionReq> = raw
                .split("||")
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .filter_map(|alt| parse_single_range(alt).ok())
                .collect();
            if reqs.is_empty() {
                return Err(ResolveError::invalid_request(format!(
                    "Invalid version range '{raw}': no valid alternatives"
                )));
            }
            reqs
        } else {
            vec![parse_single_range(raw)?]
        };

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Range matching every release at or above `version`.
    #[must_use]
    pub fn at_least(version: &Version) -> Self {
        let raw = format!(">={version}");
        let comparator = semver::Comparator {
            op: semver::Op::GreaterEq,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        };
        Self {
            raw,
            alternatives: vec![VersionReq {
                comparators: vec![comparator],
            }],
        }
    }

    /// Check whether `version` satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse an installed version string, substituting the placeholder when it
/// is not valid semver (e.g. `dev` builds).
#[must_use]
pub fn installed_version_or_placeholder(installed: &str) -> Version {
    Version::parse(installed.trim()).unwrap_or(INVALID_VERSION_PLACEHOLDER)
}

/// Compare an installed version string against a candidate.
#[must_use]
pub fn compare_installed(installed: &str, candidate: &Version) -> Ordering {
    installed_version_or_placeholder(installed).cmp(candidate)
}

/// Whether the installed version is older than `candidate`.
///
/// An unparseable installed version is never older.
#[must_use]
pub fn is_older(installed: &str, candidate: &Version) -> bool {
    compare_installed(installed, candidate) == Ordering::Less
}

fn parse_single_range(range: &str) -> Result<VersionReq, ResolveError> {
    let range = range.trim();
    let invalid = |e: semver::Error| {
        ResolveError::invalid_request(format!("Invalid version range '{range}': {e}"))
    };

    // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).map_err(invalid);
    }

    // "1.x" -> ">=1.0.0, <2.0.0"
    if range.contains('x') || range.contains('X') || range == "*" {
        return VersionReq::parse(&convert_x_range(range)).map_err(invalid);
    }

    VersionReq::parse(&convert_space_separated_comparators(range)).map_err(invalid)
}

fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

/// `>= 2.1.2 < 3.0.0` means `>=2.1.2 AND <3.0.0`; the semver crate wants commas.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut need_comma = false;

    for token in range.split_whitespace() {
        if token_has_version(token) {
            if need_comma {
                result.push_str(", ");
            }
            result.push_str(token);
            need_comma = true;
        } else {
            // Bare operator: glue it to the version that follows.
            if need_comma {
                result.push_str(", ");
                need_comma = false;
            }
            result.push_str(token);
        }
    }

    if result.is_empty() {
        range.to_string()
    } else {
        result
    }
}

fn token_has_version(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

fn convert_x_range(range: &str) -> String {
    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();
    match parts.as_slice() {
        [major, "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "0")
}
