//! Built-in recovery strategies.

use crate::error::Result;
use crate::handler::{ErrorHandler, ErrorRecord, RecoveryAction, RecoveryResult};
use crate::kinds::ErrorKind;

/// Network failures are retried this many times in total before skipping.
pub const NETWORK_MAX_ATTEMPTS: u32 = 3;

/// Timeouts are retried this many times in total before skipping.
pub const TIMEOUT_MAX_ATTEMPTS: u32 = 2;

/// Register the built-in strategy for every recoverable kind.
pub fn register_defaults(handler: &ErrorHandler) {
    handler.register_strategy(ErrorKind::Network, network);
    handler.register_strategy(ErrorKind::Timeout, timeout);
    handler.register_strategy(ErrorKind::FileSystem, skip_item);
    handler.register_strategy(ErrorKind::JsonParse, skip_item);
    handler.register_strategy(ErrorKind::YamlParse, skip_item);
    handler.register_strategy(ErrorKind::VersionRange, skip_item);
    handler.register_strategy(ErrorKind::WorkspaceConfigConflict, workspace_conflict);
    handler.register_strategy(ErrorKind::DependencyTree, dependency_tree);
    handler.register_strategy(ErrorKind::CacheCorruption, cache_corruption);
    handler.register_strategy(ErrorKind::ConflictResolution, conflict_resolution);
}

fn retry_or_skip(record: &ErrorRecord, max_attempts: u32) -> RecoveryResult {
    let attempt = record.context.attempt;
    if attempt < max_attempts {
        RecoveryResult::retry(format!(
            "retrying {} (attempt {} of {max_attempts})",
            record.context.operation,
            attempt + 1
        ))
    } else {
        RecoveryResult::recovered(
            RecoveryAction::Skip,
            format!("giving up on {} after {attempt} attempts", record.context.operation),
        )
    }
}

fn network(record: &ErrorRecord) -> Result<RecoveryResult> {
    Ok(retry_or_skip(record, NETWORK_MAX_ATTEMPTS))
}

fn timeout(record: &ErrorRecord) -> Result<RecoveryResult> {
    Ok(retry_or_skip(record, TIMEOUT_MAX_ATTEMPTS))
}

fn skip_item(record: &ErrorRecord) -> Result<RecoveryResult> {
    let target = record
        .context
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .or_else(|| record.context.package.clone())
        .unwrap_or_else(|| record.context.operation.clone());
    Ok(RecoveryResult::recovered(
        RecoveryAction::Skip,
        format!("skipped {target}"),
    ))
}

fn workspace_conflict(_record: &ErrorRecord) -> Result<RecoveryResult> {
    Ok(RecoveryResult::recovered(
        RecoveryAction::UseFallback,
        "using the highest-priority workspace configuration",
    ))
}

fn dependency_tree(record: &ErrorRecord) -> Result<RecoveryResult> {
    let package = record.context.package.clone().unwrap_or_default();
    Ok(RecoveryResult::recovered(
        RecoveryAction::Skip,
        format!("continuing without the subtree of {package}"),
    )
    .with_partial_result(serde_json::json!({ "unresolved": package })))
}

fn cache_corruption(_record: &ErrorRecord) -> Result<RecoveryResult> {
    Ok(RecoveryResult {
        success: true,
        action: RecoveryAction::BypassCache,
        message: "ignoring the cached entry and recomputing".to_string(),
        should_retry: true,
        partial_result: None,
    })
}

fn conflict_resolution(_record: &ErrorRecord) -> Result<RecoveryResult> {
    Ok(RecoveryResult::recovered(
        RecoveryAction::UseFallback,
        "keeping the conflict unresolved in the report",
    ))
}
