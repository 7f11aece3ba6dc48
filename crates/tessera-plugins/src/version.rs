//! Semantic versions and version constraints
//!
//! A [`VersionConstraint`] is one or more comma-separated comparators
//! (`>=1.2.0`, `<2.0.0`, `==1.4.1`) that must all hold. A bare version or
//! `=` means an exact match.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{PluginError, PluginResult};

/// A semantic version (`MAJOR.MINOR.PATCH[-pre][+build]`)
///
/// Pre-release versions sort below the same triple without a pre-release.
/// Build metadata is kept for display but ignored by equality and ordering.
#[derive(Debug, Clone)]
pub struct Version(semver::Version);

impl Version {
    /// Build a release version from its numeric parts
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string, failing on malformed or non-numeric segments
    pub fn parse(input: &str) -> PluginResult<Self> {
        let trimmed = input.trim();
        semver::Version::parse(trimmed)
            .map(Self)
            .map_err(|e| PluginError::InvalidVersion {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl Version {
    fn precedence(&self) -> (u64, u64, u64, &semver::Prerelease) {
        (self.0.major, self.0.minor, self.0.patch, &self.0.pre)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence() == other.precedence()
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.precedence().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = PluginError;

    fn from_str(s: &str) -> PluginResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Comparison operator in a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Exact,
}

impl Op {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Op::Greater => ordering == Ordering::Greater,
            Op::GreaterEq => ordering != Ordering::Less,
            Op::Less => ordering == Ordering::Less,
            Op::LessEq => ordering != Ordering::Greater,
            Op::Exact => ordering == Ordering::Equal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Exact => "==",
        }
    }
}

/// A single `operator + bound` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub bound: Version,
}

impl Comparator {
    pub fn matches(&self, version: &Version) -> bool {
        self.op.accepts(version.cmp(&self.bound))
    }

    fn parse(raw: &str, whole: &str) -> PluginResult<Self> {
        let invalid = |reason: String| PluginError::InvalidConstraint {
            input: whole.to_string(),
            reason,
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid("empty comparator".to_string()));
        }

        // Longest operators first so ">=" is not read as ">".
        let (op, rest) = if let Some(rest) = raw.strip_prefix(">=") {
            (Op::GreaterEq, rest)
        } else if let Some(rest) = raw.strip_prefix("<=") {
            (Op::LessEq, rest)
        } else if let Some(rest) = raw.strip_prefix("==") {
            (Op::Exact, rest)
        } else if let Some(rest) = raw.strip_prefix('>') {
            (Op::Greater, rest)
        } else if let Some(rest) = raw.strip_prefix('<') {
            (Op::Less, rest)
        } else if let Some(rest) = raw.strip_prefix('=') {
            (Op::Exact, rest)
        } else if raw.starts_with(|c: char| c.is_ascii_digit()) {
            (Op::Exact, raw)
        } else {
            let op: String = raw
                .chars()
                .take_while(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
                .collect();
            return Err(invalid(format!("unrecognized operator '{}'", op)));
        };

        let bound = Version::parse(rest).map_err(|e| match e {
            PluginError::InvalidVersion { reason, .. } => {
                invalid(format!("bad version '{}': {}", rest.trim(), reason))
            }
            other => other,
        })?;

        Ok(Self { op, bound })
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.bound)
    }
}

/// A conjunction of comparators parsed from a constraint string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    comparators: Vec<Comparator>,
}

impl VersionConstraint {
    /// Parse a constraint such as `>=1.2.0` or `>=1.0.0, <2.0.0`
    pub fn parse(input: &str) -> PluginResult<Self> {
        if input.trim().is_empty() {
            return Err(PluginError::InvalidConstraint {
                input: input.to_string(),
                reason: "empty constraint".to_string(),
            });
        }

        let comparators = input
            .split(',')
            .map(|part| Comparator::parse(part, input))
            .collect::<PluginResult<Vec<_>>>()?;

        Ok(Self {
            raw: input.trim().to_string(),
            comparators,
        })
    }

    /// Whether `version` satisfies every comparator
    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    /// The constraint as originally written (trimmed)
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionConstraint {
    type Err = PluginError;

    fn from_str(s: &str) -> PluginResult<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).expect("valid version")
    }

    #[test]
    fn test_parse_version() {
        let version = v("1.2.3");
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 2);
        assert_eq!(version.patch(), 3);
        assert!(!version.is_prerelease());
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[test]
    fn test_parse_version_rejects_malformed() {
        for bad in ["", "1", "1.2", "1.x.3", "a.b.c", "1.2.3.4", "-1.0.0"] {
            let err = Version::parse(bad).unwrap_err();
            assert!(
                matches!(err, PluginError::InvalidVersion { .. }),
                "{bad} should be invalid"
            );
        }
    }

    #[test]
    fn test_prerelease_sorts_below_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") > v("0.9.9"));
        assert!(v("1.10.0") > v("1.9.0"));
    }

    #[test]
    fn test_build_metadata_ignored_in_ordering() {
        let tagged = v("1.2.0+cu118");
        assert_eq!(tagged.cmp(&v("1.2.0")), Ordering::Equal);
        assert_eq!(tagged, v("1.2.0+cpu"));
        assert!(tagged < v("1.2.1"));
        assert!(v("1.2.0-rc.1+build.5") < tagged);
        assert_eq!(tagged.to_string(), "1.2.0+cu118");
    }

    #[test]
    fn test_constraints_against_build_tagged_version() {
        let tagged = v("1.2.0+cu118");
        assert!(VersionConstraint::parse("==1.2.0").unwrap().matches(&tagged));
        assert!(VersionConstraint::parse("<=1.2.0").unwrap().matches(&tagged));
        assert!(VersionConstraint::parse(">=1.2.0").unwrap().matches(&tagged));
        assert!(!VersionConstraint::parse(">1.2.0").unwrap().matches(&tagged));
        assert!(!VersionConstraint::parse("<1.2.0").unwrap().matches(&tagged));
    }

    #[test]
    fn test_operators() {
        let version = v("1.2.0");
        assert!(VersionConstraint::parse(">=1.2.0").unwrap().matches(&version));
        assert!(!VersionConstraint::parse(">1.2.0").unwrap().matches(&version));
        assert!(VersionConstraint::parse("<=1.2.0").unwrap().matches(&version));
        assert!(!VersionConstraint::parse("<1.2.0").unwrap().matches(&version));
        assert!(VersionConstraint::parse("==1.2.0").unwrap().matches(&version));
        assert!(VersionConstraint::parse("=1.2.0").unwrap().matches(&version));
        assert!(VersionConstraint::parse("1.2.0").unwrap().matches(&version));
        assert!(!VersionConstraint::parse("==1.2.1").unwrap().matches(&version));
    }

    #[test]
    fn test_whitespace_between_operator_and_version() {
        let c = VersionConstraint::parse(">= 1.0.0").unwrap();
        assert!(c.matches(&v("1.0.0")));
        assert_eq!(c.comparators()[0].op, Op::GreaterEq);
    }

    #[test]
    fn test_range_conjunction() {
        let c = VersionConstraint::parse(">=1.0.0, <2.0.0").unwrap();
        assert_eq!(c.comparators().len(), 2);
        assert!(c.matches(&v("1.5.0")));
        assert!(!c.matches(&v("2.0.0")));
        assert!(!c.matches(&v("0.9.0")));
        assert_eq!(c.to_string(), ">=1.0.0, <2.0.0");
    }

    #[test]
    fn test_prerelease_below_lower_bound() {
        let c = VersionConstraint::parse(">=1.0.0").unwrap();
        assert!(!c.matches(&v("1.0.0-rc.1")));
    }

    #[test]
    fn test_invalid_constraints() {
        for bad in ["", "   ", "~>1.0.0", "^1.0.0", ">=abc", ">=1.0", ">=1.0.0,", "!=1.0.0"] {
            let err = VersionConstraint::parse(bad).unwrap_err();
            assert!(
                matches!(err, PluginError::InvalidConstraint { .. }),
                "{bad:?} should be an invalid constraint, got {err:?}"
            );
        }
    }

    #[test]
    fn test_unrecognized_operator_reason() {
        let err = VersionConstraint::parse("~>1.0.0").unwrap_err();
        assert!(err.to_string().contains("unrecognized operator '~>'"));
    }

    #[test]
    fn test_version_serde_as_string() {
        let json = serde_json::to_string(&v("2.1.0")).unwrap();
        assert_eq!(json, "\"2.1.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("2.1.0"));
        assert!(serde_json::from_str::<Version>("\"2.x\"").is_err());
    }
}
