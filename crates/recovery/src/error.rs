//! Error types for the recovery framework itself.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for recovery strategies.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by recovery strategies.
///
/// These never escape [`crate::ErrorHandler::handle`]; they are logged and
/// recorded as "no recovery".
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A strategy returned an error.
    #[error("Recovery strategy for {kind} failed: {message}")]
    #[diagnostic(code(monodep::recovery::strategy_failed))]
    StrategyFailed {
        /// Kind the strategy was registered for.
        kind: String,
        /// Description of the failure.
        message: String,
    },

    /// A strategy panicked.
    #[error("Recovery strategy for {kind} panicked")]
    #[diagnostic(
        code(monodep::recovery::strategy_panicked),
        help("This is a bug in the registered strategy")
    )]
    StrategyPanicked {
        /// Kind the strategy was registered for.
        kind: String,
    },
}

impl Error {
    /// Create a strategy failure.
    #[must_use]
    pub fn strategy_failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StrategyFailed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
