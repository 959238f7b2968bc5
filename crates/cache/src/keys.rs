//! Deterministic cache keys and input hashes.

use crate::{Error, Result};
use monodep_versions::VersionRange;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Incremental SHA-256 over a sequence of fields.
///
/// Fields are length-prefixed so that `("ab", "c")` and `("a", "bc")` hash
/// differently.
#[derive(Clone, Default)]
pub struct InputHasher {
    digest: Sha256,
}

impl std::fmt::Debug for InputHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHasher").finish_non_exhaustive()
    }
}

impl InputHasher {
    /// Start a new hash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one field.
    pub fn update(&mut self, field: impl AsRef<[u8]>) -> &mut Self {
        let bytes = field.as_ref();
        self.digest.update((bytes.len() as u64).to_le_bytes());
        self.digest.update(bytes);
        self
    }

    /// Feed a serializable value as canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be encoded.
    pub fn update_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::encode("key input", e))?;
        Ok(self.update(bytes))
    }

    /// Hex-encoded digest.
    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.digest.finalize())
    }
}

/// Key for the resolution of one package name and requested range.
///
/// Ranges that parse are normalized first, so `^ 1.2.3` and `^1.2.3` share
/// a key.
#[must_use]
pub fn package_key(name: &str, range: &str) -> String {
    let normalized = VersionRange::parse(range)
        .map_or_else(|_| range.trim().to_string(), |r| r.normalized());
    let mut hasher = InputHasher::new();
    hasher.update("package").update(name).update(normalized);
    hasher.finish()
}

/// Key for a whole dependency tree.
///
/// Combines the number of root packages, every build option and a digest
/// identifying the package set.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the options cannot be encoded.
pub fn tree_key<O: Serialize + ?Sized>(
    package_count: usize,
    options: &O,
    package_digest: &str,
) -> Result<String> {
    let mut hasher = InputHasher::new();
    hasher
        .update("tree")
        .update(package_count.to_string())
        .update_json(options)?
        .update(package_digest);
    Ok(hasher.finish())
}
