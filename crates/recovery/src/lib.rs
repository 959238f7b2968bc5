//! Error classification and recovery for monodep.
//!
//! Every failure that monodep can survive flows through an [`ErrorHandler`]:
//! the error is classified into an [`ErrorKind`], recorded in a bounded
//! history, and handed to the strategy registered for its kind. Strategies
//! decide whether the caller should retry, skip the item or fall back.
//!
//! Crates implement [`Classify`] for their own error types so that the
//! handler can classify them without inspecting messages.

pub mod classify;
pub mod error;
pub mod handler;
pub mod kinds;
pub mod strategies;

pub use classify::{Classify, MessageError, classify, classify_message};
pub use error::{Error, Result};
pub use handler::{
    DEFAULT_HISTORY_LIMIT, Diagnostics, ErrorContext, ErrorHandler, ErrorRecord, ErrorStatistics,
    RecoveryAction, RecoveryResult, RecoveryStrategy,
};
pub use kinds::{ErrorDefinition, ErrorKind, Severity};
