//! The error handler: classification, history and strategy dispatch.

use crate::classify::{Classify, classify};
use crate::error::{Error, Result};
use crate::kinds::{ErrorKind, Severity};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default number of history entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 1_000;

/// Where an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// The operation that failed, e.g. `resolve_node`.
    pub operation: String,
    /// Package involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// File involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// 1-based attempt counter for retried operations.
    pub attempt: u32,
    /// Free-form details.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Context for a named operation, first attempt.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attempt: 1,
            ..Self::default()
        }
    }

    /// Attach a package name.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Attach a path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the attempt counter.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Attach a detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// What a recovery strategy did about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Try the operation again.
    Retry,
    /// Skip the failing item and continue.
    Skip,
    /// Continue with a substitute value.
    UseFallback,
    /// Ignore cached data and recompute.
    BypassCache,
    /// Nothing was done.
    None,
}

/// Outcome of a recovery strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// Whether the strategy considers the error handled.
    pub success: bool,
    /// Action taken.
    pub action: RecoveryAction,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the operation is worthwhile.
    pub should_retry: bool,
    /// Optional substitute data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<serde_json::Value>,
}

impl RecoveryResult {
    /// A successful recovery without retry.
    #[must_use]
    pub fn recovered(action: RecoveryAction, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action,
            message: message.into(),
            should_retry: false,
            partial_result: None,
        }
    }

    /// Ask the caller to retry.
    #[must_use]
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: RecoveryAction::Retry,
            message: message.into(),
            should_retry: true,
            partial_result: None,
        }
    }

    /// No recovery was possible.
    #[must_use]
    pub fn unrecovered(message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: RecoveryAction::None,
            message: message.into(),
            should_retry: false,
            partial_result: None,
        }
    }

    /// Attach substitute data.
    #[must_use]
    pub fn with_partial_result(mut self, value: serde_json::Value) -> Self {
        self.partial_result = Some(value);
        self
    }
}

/// One handled error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unique id.
    pub id: Uuid,
    /// Classified kind.
    pub kind: ErrorKind,
    /// Severity from the kind's definition.
    pub severity: Severity,
    /// Rendered error message.
    pub message: String,
    /// When the error was handled.
    pub timestamp: DateTime<Utc>,
    /// Where it happened.
    pub context: ErrorContext,
    /// Time spent classifying and recovering.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// What recovery did, if a strategy ran.
    pub recovery: Option<RecoveryResult>,
}

impl ErrorRecord {
    /// Whether a strategy ran and reported success.
    #[must_use]
    pub fn recovered(&self) -> bool {
        self.recovery.as_ref().is_some_and(|r| r.success)
    }

    /// Whether the strategy asked for a retry.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.recovery.as_ref().is_some_and(|r| r.should_retry)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// A recovery strategy for one [`ErrorKind`].
pub trait RecoveryStrategy: Send + Sync {
    /// Attempt to recover from the recorded error.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy itself fails. The handler logs it
    /// and treats the error as unrecovered.
    fn recover(&self, record: &ErrorRecord) -> Result<RecoveryResult>;
}

impl<F> RecoveryStrategy for F
where
    F: Fn(&ErrorRecord) -> Result<RecoveryResult> + Send + Sync,
{
    fn recover(&self, record: &ErrorRecord) -> Result<RecoveryResult> {
        self(record)
    }
}

/// Aggregates derived from the history on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Number of errors in the history.
    pub total: usize,
    /// Count per kind.
    pub by_kind: BTreeMap<ErrorKind, usize>,
    /// Count per severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Errors for which a strategy ran.
    pub recovery_attempts: usize,
    /// Errors for which the strategy reported success.
    pub successful_recoveries: usize,
    /// `successful_recoveries / recovery_attempts`, 0 when nothing was attempted.
    pub recovery_rate: f64,
}

/// Diagnostic output for one [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Kind described.
    pub kind: ErrorKind,
    /// Default severity.
    pub severity: Severity,
    /// Whether strategies are attempted at all.
    pub recoverable: bool,
    /// Whether a strategy is currently registered for the kind.
    pub has_strategy: bool,
    /// Message suitable for end users.
    pub user_message: String,
    /// Typical causes.
    pub common_causes: Vec<String>,
    /// Typical fixes.
    pub solutions: Vec<String>,
}

/// Classifies errors, keeps a bounded history and runs recovery strategies.
///
/// The handler is shared across concurrent resolution tasks; every method
/// takes `&self`.
pub struct ErrorHandler {
    strategies: RwLock<HashMap<ErrorKind, Arc<dyn RecoveryStrategy>>>,
    history: Mutex<VecDeque<ErrorRecord>>,
    history_limit: usize,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("strategies", &self.strategies.read().keys().collect::<Vec<_>>())
            .field("history_len", &self.history.lock().len())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl ErrorHandler {
    /// A handler with no strategies and the given history bound.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_limit.min(64))),
            history_limit: history_limit.max(1),
        }
    }

    /// A handler with the built-in strategies registered.
    #[must_use]
    pub fn with_default_strategies(history_limit: usize) -> Self {
        let handler = Self::new(history_limit);
        crate::strategies::register_defaults(&handler);
        handler
    }

    /// Register (or replace) the strategy for `kind`.
    pub fn register_strategy(&self, kind: ErrorKind, strategy: impl RecoveryStrategy + 'static) {
        self.strategies.write().insert(kind, Arc::new(strategy));
    }

    /// Remove the strategy for `kind`.
    pub fn unregister_strategy(&self, kind: ErrorKind) {
        self.strategies.write().remove(&kind);
    }

    /// Classify, record and possibly recover from an error.
    ///
    /// Never fails: strategy errors and panics are logged and recorded as
    /// "no recovery".
    pub fn handle(&self, error: &dyn Classify, context: ErrorContext) -> ErrorRecord {
        let started = Instant::now();
        let kind = classify(error);
        let definition = kind.definition();

        let mut record = ErrorRecord {
            id: Uuid::new_v4(),
            kind,
            severity: definition.severity,
            message: error.to_string(),
            timestamp: Utc::now(),
            context,
            duration: Duration::ZERO,
            recovery: None,
        };

        tracing::warn!(
            error_id = %record.id,
            kind = %kind,
            operation = %record.context.operation,
            package = record.context.package.as_deref().unwrap_or("-"),
            "{}",
            record.message
        );

        if definition.recoverable {
            let strategy = self.strategies.read().get(&kind).cloned();
            if let Some(strategy) = strategy {
                record.recovery = Some(Self::run_strategy(kind, strategy.as_ref(), &record));
            }
        }

        record.duration = started.elapsed();
        self.push(record.clone());
        record
    }

    fn run_strategy(
        kind: ErrorKind,
        strategy: &dyn RecoveryStrategy,
        record: &ErrorRecord,
    ) -> RecoveryResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| strategy.recover(record))).unwrap_or_else(
            |_| {
                Err(Error::StrategyPanicked {
                    kind: kind.to_string(),
                })
            },
        );

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    error_id = %record.id,
                    action = ?result.action,
                    success = result.success,
                    "Recovery strategy finished: {}",
                    result.message
                );
                result
            }
            Err(e) => {
                tracing::error!(error_id = %record.id, "Recovery strategy failed: {e}");
                RecoveryResult::unrecovered(format!("recovery failed: {e}"))
            }
        }
    }

    fn push(&self, record: ErrorRecord) {
        let mut history = self.history.lock();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Snapshot of the history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ErrorRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Number of records currently kept.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Drop all history.
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// User-facing causes and solutions for a kind.
    #[must_use]
    pub fn diagnostics(&self, kind: ErrorKind) -> Diagnostics {
        let definition = kind.definition();
        Diagnostics {
            kind,
            severity: definition.severity,
            recoverable: definition.recoverable,
            has_strategy: self.strategies.read().contains_key(&kind),
            user_message: definition.user_message.to_string(),
            common_causes: definition.common_causes.iter().map(ToString::to_string).collect(),
            solutions: definition.solutions.iter().map(ToString::to_string).collect(),
        }
    }

    /// Compute statistics from the current history.
    #[must_use]
    pub fn statistics(&self) -> ErrorStatistics {
        let history = self.history.lock();
        let mut stats = ErrorStatistics {
            total: history.len(),
            ..ErrorStatistics::default()
        };

        for record in history.iter() {
            *stats.by_kind.entry(record.kind).or_default() += 1;
            *stats.by_severity.entry(record.severity).or_default() += 1;
            if let Some(recovery) = &record.recovery {
                stats.recovery_attempts += 1;
                if recovery.success {
                    stats.successful_recoveries += 1;
                }
            }
        }

        if stats.recovery_attempts > 0 {
            stats.recovery_rate =
                stats.successful_recoveries as f64 / stats.recovery_attempts as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MessageError;

    fn message(text: &str) -> MessageError {
        MessageError(text.to_string())
    }

    #[test]
    fn test_handle_records_history() {
        let handler = ErrorHandler::new(10);
        let record = handler.handle(&message("connection reset"), ErrorContext::new("fetch"));

        assert_eq!(record.kind, ErrorKind::Network);
        assert_eq!(record.severity, Severity::Medium);
        assert!(record.recovery.is_none());
        assert_eq!(handler.history_len(), 1);
        assert_eq!(handler.history()[0].id, record.id);
    }

    #[test]
    fn test_history_is_bounded() {
        let handler = ErrorHandler::new(3);
        for i in 0..5 {
            handler.handle(&message(&format!("file {i} missing")), ErrorContext::new("read"));
        }
        let history = handler.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "file 2 missing");
        assert_eq!(history[2].message, "file 4 missing");
    }

    #[test]
    fn test_strategy_runs_for_recoverable_kind() {
        let handler = ErrorHandler::new(10);
        handler.register_strategy(ErrorKind::Network, |_: &ErrorRecord| {
            Ok(RecoveryResult::retry("try again"))
        });

        let record = handler.handle(&message("network unreachable"), ErrorContext::new("fetch"));
        assert!(record.recovered());
        assert!(record.should_retry());
    }

    #[test]
    fn test_strategy_skipped_for_non_recoverable_kind() {
        let handler = ErrorHandler::new(10);
        handler.register_strategy(ErrorKind::MemoryLimit, |_: &ErrorRecord| {
            Ok(RecoveryResult::recovered(RecoveryAction::Skip, "never"))
        });

        let record = handler.handle(&message("out of memory"), ErrorContext::new("build"));
        assert_eq!(record.kind, ErrorKind::MemoryLimit);
        assert!(record.recovery.is_none());
    }

    #[test]
    fn test_failing_strategy_is_contained() {
        let handler = ErrorHandler::new(10);
        handler.register_strategy(ErrorKind::Timeout, |_: &ErrorRecord| {
            Err(Error::strategy_failed("timeout", "boom"))
        });

        let record = handler.handle(&message("timed out"), ErrorContext::new("fetch"));
        let recovery = record.recovery.unwrap();
        assert!(!recovery.success);
        assert_eq!(recovery.action, RecoveryAction::None);
    }

    #[test]
    #[allow(clippy::panic)]
    fn test_panicking_strategy_is_contained() {
        let handler = ErrorHandler::new(10);
        handler.register_strategy(ErrorKind::Timeout, |_: &ErrorRecord| -> Result<RecoveryResult> {
            panic!("strategy bug")
        });

        let record = handler.handle(&message("timed out"), ErrorContext::new("fetch"));
        assert!(!record.recovered());
        assert!(record.recovery.unwrap().message.contains("panicked"));
    }

    #[test]
    fn test_statistics_are_derived_from_history() {
        let handler = ErrorHandler::new(10);
        handler.register_strategy(ErrorKind::Network, |_: &ErrorRecord| {
            Ok(RecoveryResult::retry("again"))
        });
        handler.register_strategy(ErrorKind::Timeout, |_: &ErrorRecord| {
            Ok(RecoveryResult::unrecovered("gave up"))
        });

        handler.handle(&message("network down"), ErrorContext::new("a"));
        handler.handle(&message("timed out"), ErrorContext::new("b"));
        handler.handle(&message("mystery"), ErrorContext::new("c"));

        let stats = handler.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_kind.get(&ErrorKind::Network), Some(&1));
        assert_eq!(stats.by_kind.get(&ErrorKind::Unknown), Some(&1));
        assert_eq!(stats.recovery_attempts, 2);
        assert_eq!(stats.successful_recoveries, 1);
        assert!((stats.recovery_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_context_builder() {
        let context = ErrorContext::new("parse_manifest")
            .with_package("web")
            .with_path("/repo/apps/web/package.json")
            .with_attempt(2)
            .with_detail("phase", "discovery");
        assert_eq!(context.attempt, 2);
        assert_eq!(context.package.as_deref(), Some("web"));
        assert_eq!(context.details.get("phase").map(String::as_str), Some("discovery"));
    }
}
