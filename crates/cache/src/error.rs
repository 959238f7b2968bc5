//! Cache errors.

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Something the cache could not do on disk.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No candidate base directory could be created or written.
    #[error("No writable cache directory found")]
    #[diagnostic(
        code(monodep::cache::no_directory),
        help("Set MONODEP_CACHE_DIR, or `directory` in the [cache] section, to a writable path")
    )]
    NoDirectory,

    /// A filesystem call on a cache file failed.
    #[error("Cache {operation} failed at {}", path.display())]
    #[diagnostic(code(monodep::cache::io))]
    Io {
        /// The underlying error.
        #[source]
        source: std::io::Error,
        /// File or directory involved.
        path: PathBuf,
        /// `read`, `write`, `rename`, ...
        operation: &'static str,
    },

    /// A persisted entry or snapshot could not be decoded.
    #[error("Corrupt cache entry {key}: {message}")]
    #[diagnostic(
        code(monodep::cache::corrupt),
        help("Run `monodep cache clear` to remove the damaged entries")
    )]
    Corrupt {
        /// Key of the entry, or the snapshot file name.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// A value could not be encoded for storage or hashing.
    #[error("Failed to encode {what}")]
    #[diagnostic(code(monodep::cache::encode))]
    Encode {
        /// What was being encoded.
        what: String,
        /// The encoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(source: std::io::Error, path: impl AsRef<Path>, operation: &'static str) -> Self {
        Self::Io {
            source,
            path: path.as_ref().to_path_buf(),
            operation,
        }
    }

    pub(crate) fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn encode(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            what: what.into(),
            source,
        }
    }
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(match self {
            Self::NoDirectory | Self::Io { .. } => ErrorKind::FileSystem,
            Self::Corrupt { .. } | Self::Encode { .. } => ErrorKind::CacheCorruption,
        })
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
