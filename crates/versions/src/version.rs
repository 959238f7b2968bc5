//! Semantic version value type.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
    )
    .expect("version pattern is a valid regex")
});

/// A parsed semantic version.
///
/// Ordering and equality consider `major`, `minor`, `patch` and the
/// prerelease tag. Build metadata and the original text are carried along
/// but never compared.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Dot-separated prerelease identifiers, without the leading `-`.
    pub prerelease: Option<String>,
    /// Build metadata, without the leading `+`.
    pub build: Option<String>,
    /// The text this version was parsed from.
    pub raw: String,
}

impl SemanticVersion {
    /// Parse a version string such as `1.2.3`, `v2.0.0-rc.1` or `1.0.0+sha.5`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersionFormat`] when the input does not match
    /// the strict `major.minor.patch[-prerelease][+build]` grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let captures = VERSION_PATTERN
            .captures(body)
            .ok_or_else(|| Error::invalid_version(input))?;

        let numeric = |index: usize| -> Result<u64> {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .ok_or_else(|| Error::invalid_version(input))
        };

        Ok(Self {
            major: numeric(1)?,
            minor: numeric(2)?,
            patch: numeric(3)?,
            prerelease: captures.get(4).map(|m| m.as_str().to_string()),
            build: captures.get(5).map(|m| m.as_str().to_string()),
            raw: input.to_string(),
        })
    }

    /// Build a release version from its numeric components.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
            raw: format!("{major}.{minor}.{patch}"),
        }
    }

    /// Whether this version carries a prerelease tag.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Whether this version is below 1.0.0, where every minor bump may break.
    #[must_use]
    pub fn is_pre_stable(&self) -> bool {
        self.major == 0
    }

    /// The first version of the next major line.
    #[must_use]
    pub fn next_major(&self) -> Self {
        Self::new(self.major.saturating_add(1), 0, 0)
    }

    /// The first version of the next minor line.
    #[must_use]
    pub fn next_minor(&self) -> Self {
        Self::new(self.major, self.minor.saturating_add(1), 0)
    }

    /// The next patch release.
    #[must_use]
    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch.saturating_add(1))
    }

    /// `(major, minor, patch)` as a tuple.
    #[must_use]
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

/// Compare two dot-separated prerelease tags.
///
/// Numeric identifiers compare numerically and sort before alphanumeric
/// ones; a tag that is a strict prefix of another sorts first.
fn compare_prerelease(left: &str, right: &str) -> Ordering {
    let mut left_ids = left.split('.');
    let mut right_ids = right.split('.');

    loop {
        match (left_ids.next(), right_ids.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                let ordering = match (is_numeric(a), is_numeric(b)) {
                    (true, true) => compare_numeric(a, b),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.cmp(b),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn is_numeric(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
}

// Arbitrary-length digit strings: shorter (after leading zeros) is smaller.
fn compare_numeric(left: &str, right: &str) -> Ordering {
    let trimmed_left = left.trim_start_matches('0');
    let trimmed_right = right.trim_start_matches('0');
    trimmed_left
        .len()
        .cmp(&trimmed_right.len())
        .then_with(|| trimmed_left.cmp(trimmed_right))
        .then_with(|| left.cmp(right))
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple()
            .cmp(&other.triple())
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.triple().hash(state);
        self.prerelease.hash(state);
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Compare two version strings.
///
/// # Errors
///
/// Returns an error if either side fails to parse.
pub fn compare(left: &str, right: &str) -> Result<Ordering> {
    Ok(SemanticVersion::parse(left)?.cmp(&SemanticVersion::parse(right)?))
}
