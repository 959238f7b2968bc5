//! Cached values and their bookkeeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A cached value with the metadata needed for expiry and invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResolution<T> {
    /// Cache key.
    pub key: String,
    /// The cached value.
    pub result: T,
    /// When the value was computed.
    pub created_at: DateTime<Utc>,
    /// Number of reads served.
    pub access_count: u64,
    /// Digest of the inputs the value was computed from.
    pub input_hash: String,
    /// Set by [`crate::ResolutionCache::invalidate`]; never served again.
    #[serde(default)]
    pub invalidated: bool,
}

impl<T> CachedResolution<T> {
    /// A fresh entry created now.
    pub fn new(key: impl Into<String>, result: T, input_hash: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            result,
            created_at: Utc::now(),
            access_count: 0,
            input_hash: input_hash.into(),
            invalidated: false,
        }
    }

    /// Whether the entry is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }

    /// Whether the entry may be served at `now`.
    #[must_use]
    pub fn is_servable_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        !self.invalidated && !self.is_expired_at(ttl, now)
    }
}

/// The fields of a persisted entry needed without decoding the value.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryHeader {
    pub key: String,
    pub input_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let entry = CachedResolution::new("k", 1_u32, "h");
        let ttl = Duration::seconds(60);
        assert!(entry.is_servable_at(ttl, entry.created_at));
        assert!(!entry.is_expired_at(ttl, entry.created_at + Duration::seconds(59)));
        assert!(entry.is_expired_at(ttl, entry.created_at + Duration::seconds(60)));
    }

    #[test]
    fn test_invalidated_is_never_servable() {
        let mut entry = CachedResolution::new("k", 1_u32, "h");
        entry.invalidated = true;
        assert!(!entry.is_servable_at(Duration::days(1), entry.created_at));
    }
}
