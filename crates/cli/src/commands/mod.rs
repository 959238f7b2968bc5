//! Command implementations.
//!
//! Each command returns its rendered output and exit code; printing and
//! error rendering stay in `main`.

pub mod analyze;
pub mod cache;
pub mod cycles;

use crate::cli::{CliError, Commands, OkEnvelope, OutputFormat, RepositoryArgs};
use monodep_analyzer::AnalyzerConfig;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What a command prints and how the process exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Text for stdout.
    pub text: String,
    /// Process exit code.
    pub exit_code: i32,
}

/// Run `command`.
///
/// # Errors
///
/// Returns a [`CliError`] for configuration problems, failed analyses and
/// cancellation.
pub async fn execute(
    command: Commands,
    json_mode: bool,
    cancel: CancellationToken,
) -> Result<CommandOutput, CliError> {
    match command {
        Commands::Analyze(args) => analyze::execute(args, json_mode, cancel).await,
        Commands::Cycles(args) => cycles::execute(args, json_mode).await,
        Commands::Cache { subcommand } => cache::execute(subcommand, json_mode),
    }
}

pub(crate) fn load_config(repository: &RepositoryArgs) -> Result<AnalyzerConfig, CliError> {
    Ok(AnalyzerConfig::load(
        &repository.path,
        repository.config.as_deref(),
    )?)
}

/// JSON when asked for, the text renderer otherwise. `--json` wraps the
/// data in an [`OkEnvelope`].
pub(crate) fn render<T: Serialize>(
    data: &T,
    format: OutputFormat,
    json_mode: bool,
    text: impl FnOnce(&mut String) -> fmt::Result,
) -> Result<String, CliError> {
    let json = if json_mode {
        serde_json::to_string(&OkEnvelope::new(data))
    } else if format == OutputFormat::Json {
        serde_json::to_string_pretty(data)
    } else {
        let mut out = String::new();
        text(&mut out).map_err(|e| CliError::analysis(format!("Failed to render output: {e}")))?;
        return Ok(out);
    };
    json.map_err(|e| CliError::analysis(format!("Failed to serialize output: {e}")))
}
