//! Mapping concrete errors onto [`ErrorKind`]s.

use crate::kinds::ErrorKind;
use std::fmt;

/// Errors that can be classified by the [`crate::ErrorHandler`].
///
/// Implementors return `Some(kind)` when their concrete type determines the
/// kind. Returning `None` makes the handler fall back to matching the
/// rendered message.
pub trait Classify: std::error::Error + Send + Sync {
    /// The kind implied by the concrete error, if any.
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }
}

impl Classify for std::io::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self.kind() {
            std::io::ErrorKind::TimedOut => Some(ErrorKind::Timeout),
            std::io::ErrorKind::OutOfMemory => Some(ErrorKind::MemoryLimit),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Some(ErrorKind::Network),
            _ => Some(ErrorKind::FileSystem),
        }
    }
}

impl Classify for serde_json::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        if self.is_io() {
            Some(ErrorKind::FileSystem)
        } else {
            Some(ErrorKind::JsonParse)
        }
    }
}

impl Classify for serde_yaml::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(ErrorKind::YamlParse)
    }
}

impl Classify for tokio::time::error::Elapsed {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(ErrorKind::Timeout)
    }
}

impl Classify for monodep_versions::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(ErrorKind::VersionRange)
    }
}

/// An error known only by its message, classified purely by text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError(pub String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MessageError {}

impl Classify for MessageError {}

// First match wins, so more specific phrases come before general ones.
const MESSAGE_RULES: &[(&str, ErrorKind)] = &[
    ("timed out", ErrorKind::Timeout),
    ("timeout", ErrorKind::Timeout),
    ("deadline", ErrorKind::Timeout),
    ("out of memory", ErrorKind::MemoryLimit),
    ("memory limit", ErrorKind::MemoryLimit),
    ("cache", ErrorKind::CacheCorruption),
    ("corrupt", ErrorKind::CacheCorruption),
    ("circular", ErrorKind::CircularDependency),
    ("cycle", ErrorKind::CircularDependency),
    ("yaml", ErrorKind::YamlParse),
    ("json", ErrorKind::JsonParse),
    ("workspace config", ErrorKind::WorkspaceConfigConflict),
    ("multiple workspace", ErrorKind::WorkspaceConfigConflict),
    ("econnrefused", ErrorKind::Network),
    ("network", ErrorKind::Network),
    ("connection", ErrorKind::Network),
    ("registry", ErrorKind::Network),
    ("dns", ErrorKind::Network),
    ("http", ErrorKind::Network),
    ("conflict", ErrorKind::ConflictResolution),
    ("semver", ErrorKind::VersionRange),
    ("version", ErrorKind::VersionRange),
    ("range", ErrorKind::VersionRange),
    ("dependency tree", ErrorKind::DependencyTree),
    ("resolve", ErrorKind::DependencyTree),
    ("depth", ErrorKind::DependencyTree),
    ("enoent", ErrorKind::FileSystem),
    ("no such file", ErrorKind::FileSystem),
    ("permission denied", ErrorKind::FileSystem),
    ("directory", ErrorKind::FileSystem),
    ("file", ErrorKind::FileSystem),
];

/// Classify an error message by case-insensitive substring matching.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map_or(ErrorKind::Unknown, |(_, kind)| *kind)
}

/// Classify an error: concrete type first, message text second.
#[must_use]
pub fn classify(error: &dyn Classify) -> ErrorKind {
    error
        .error_kind()
        .unwrap_or_else(|| classify_message(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_type_wins_over_message() {
        let error = std::io::Error::new(std::io::ErrorKind::NotFound, "network share missing");
        assert_eq!(classify(&error), ErrorKind::FileSystem);
    }

    #[test]
    fn test_io_timeout() {
        let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(classify(&error), ErrorKind::Timeout);
    }

    #[test]
    fn test_json_error() {
        let error = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        assert_eq!(classify(&error), ErrorKind::JsonParse);
    }

    #[test]
    fn test_version_error() {
        let error = monodep_versions::SemanticVersion::parse("1.x").unwrap_err();
        assert_eq!(classify(&error), ErrorKind::VersionRange);
    }

    #[test]
    fn test_message_fallback_is_case_insensitive() {
        assert_eq!(
            classify(&MessageError("Request TIMED OUT after 30s".into())),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify(&MessageError("ECONNREFUSED 127.0.0.1:4873".into())),
            ErrorKind::Network
        );
        assert_eq!(
            classify(&MessageError("Circular import between a and b".into())),
            ErrorKind::CircularDependency
        );
        assert_eq!(classify(&MessageError("something odd".into())), ErrorKind::Unknown);
    }
}
