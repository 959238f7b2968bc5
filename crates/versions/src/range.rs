//! Single-operator version ranges.

use crate::error::{Error, Result};
use crate::version::SemanticVersion;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The comparison operator at the head of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RangeOperator {
    /// `^X.Y.Z` - compatible with the left-most non-zero component.
    #[serde(rename = "^")]
    Caret,
    /// `~X.Y.Z` - same major and minor.
    #[serde(rename = "~")]
    Tilde,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// `<=`
    #[serde(rename = "<=")]
    LessOrEqual,
    /// `>`
    #[serde(rename = ">")]
    Greater,
    /// `<`
    #[serde(rename = "<")]
    Less,
    /// `=` or no operator at all.
    #[serde(rename = "=")]
    Exact,
}

impl RangeOperator {
    /// The textual token for this operator.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::Exact => "=",
        }
    }

    /// Split a leading operator token off `input`.
    ///
    /// Two-character tokens are matched before their one-character prefixes.
    fn split(input: &str) -> (Self, &str) {
        const TOKENS: [(&str, RangeOperator); 7] = [
            (">=", RangeOperator::GreaterOrEqual),
            ("<=", RangeOperator::LessOrEqual),
            ("^", RangeOperator::Caret),
            ("~", RangeOperator::Tilde),
            (">", RangeOperator::Greater),
            ("<", RangeOperator::Less),
            ("=", RangeOperator::Exact),
        ];

        TOKENS
            .iter()
            .find_map(|(token, op)| input.strip_prefix(token).map(|rest| (*op, rest)))
            .unwrap_or((Self::Exact, input))
    }
}

impl fmt::Display for RangeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A predicate over [`SemanticVersion`]s made of one operator and one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    /// The text this range was parsed from.
    pub raw: String,
    /// Leading operator (`=` when none was written).
    pub operator: RangeOperator,
    /// The version the operator applies to.
    pub version: SemanticVersion,
}

impl VersionRange {
    /// Parse a range such as `^1.2.3`, `>= 2.0.0` or `1.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if the text after the operator is not a
    /// valid version.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_range(input, "range is empty"));
        }

        let (operator, rest) = RangeOperator::split(trimmed);
        let rest = rest.trim_start();
        if rest.starts_with(['^', '~', '>', '<', '=']) {
            return Err(Error::invalid_range(input, "more than one operator"));
        }

        let version = SemanticVersion::parse(rest).map_err(|_| {
            Error::invalid_range(input, format!("'{rest}' is not a valid version"))
        })?;

        Ok(Self {
            raw: input.to_string(),
            operator,
            version,
        })
    }

    /// Whether `candidate` falls inside this range.
    #[must_use]
    pub fn satisfies(&self, candidate: &SemanticVersion) -> bool {
        let base = &self.version;
        match self.operator {
            RangeOperator::Caret => {
                if base.major > 0 {
                    candidate.major == base.major && candidate >= base
                } else if base.minor > 0 {
                    candidate.major == 0 && candidate.minor == base.minor && candidate >= base
                } else {
                    candidate == base
                }
            }
            RangeOperator::Tilde => {
                candidate.major == base.major && candidate.minor == base.minor && candidate >= base
            }
            RangeOperator::GreaterOrEqual => candidate >= base,
            RangeOperator::LessOrEqual => candidate <= base,
            RangeOperator::Greater => candidate > base,
            RangeOperator::Less => candidate < base,
            RangeOperator::Exact => candidate == base,
        }
    }

    /// The first version outside the range on its upper side, for operators
    /// that have one.
    ///
    /// `^1.2.3` yields `2.0.0`, `^0.2.3` yields `0.3.0`, `^0.0.3` yields
    /// `0.0.4` and `~1.2.3` yields `1.3.0`.
    #[must_use]
    pub fn upper_boundary(&self) -> Option<SemanticVersion> {
        let base = &self.version;
        match self.operator {
            RangeOperator::Caret if base.major > 0 => Some(base.next_major()),
            RangeOperator::Caret if base.minor > 0 => Some(base.next_minor()),
            RangeOperator::Caret => Some(base.next_patch()),
            RangeOperator::Tilde => Some(base.next_minor()),
            _ => None,
        }
    }

    /// Canonical text of this range, independent of spacing and `v` prefixes.
    #[must_use]
    pub fn normalized(&self) -> String {
        format!("{}{}", self.operator, self.version)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Check a version string against a range string.
///
/// # Errors
///
/// Returns an error if either the range or the version fails to parse.
pub fn satisfies(range: &str, version: &str) -> Result<bool> {
    let range = VersionRange::parse(range)?;
    let version = SemanticVersion::parse(version)?;
    Ok(range.satisfies(&version))
}
