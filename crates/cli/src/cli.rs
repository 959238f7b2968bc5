use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// The analysis found what `--fail-on` asked about
pub const EXIT_FINDINGS: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Analysis error exit code
pub const EXIT_ANALYSIS: i32 = 3;
/// Interrupted by Ctrl-C (128 + SIGINT)
pub const EXIT_SIGINT: i32 = 130;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(monodep::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The analysis itself failed (exit code 3)
    #[error("Analysis failed: {message}")]
    #[diagnostic(code(monodep::cli::analysis))]
    Analysis {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Ctrl-C arrived before the command finished (exit code 130)
    #[error("Interrupted")]
    #[diagnostic(code(monodep::cli::interrupted))]
    Interrupted,
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new analysis error
    #[must_use]
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new analysis error with help text
    #[must_use]
    pub fn analysis_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Analysis {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Configuration problems exit with 2, everything else with 3.
impl From<monodep_analyzer::Error> for CliError {
    fn from(err: monodep_analyzer::Error) -> Self {
        use monodep_analyzer::Error;

        if err.is_cancelled() {
            return Self::Interrupted;
        }
        let help = miette::Diagnostic::help(&err).map(|h| h.to_string());
        let message = err.to_string();
        match (err, help) {
            (
                Error::ConfigRead { .. } | Error::ConfigParse { .. } | Error::ConfigMissing { .. },
                help,
            ) => Self::Config { message, help },
            (Error::Workspace(_), None) => Self::analysis_with_help(
                message,
                "Check that the path points at a repository root",
            ),
            (_, help) => Self::Analysis { message, help },
        }
    }
}

impl From<monodep_cache::Error> for CliError {
    fn from(err: monodep_cache::Error) -> Self {
        Self::analysis_with_help(
            err.to_string(),
            "Check the cache directory, or set MONODEP_CACHE_DIR",
        )
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Analysis { .. } => EXIT_ANALYSIS,
        CliError::Interrupted => EXIT_SIGINT,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Analysis { .. } => "analysis",
                CliError::Interrupted => "interrupted",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Output format for command results
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum, Serialize, Deserialize, Default)]
#[must_use]
pub enum OutputFormat {
    /// Plain text summary
    #[default]
    Text,
    /// The full result as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Dependency analysis for JavaScript monorepos.
#[derive(Parser, Debug)]
#[command(name = "monodep")]
#[command(about = "Dependency trees, version conflicts and circular dependencies of JavaScript monorepos")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Log line format.
    #[arg(
        long,
        global = true,
        help = "Log line format",
        default_value = "pretty",
        value_enum
    )]
    pub log_format: crate::tracing::TracingFormat,

    /// Emit JSON envelopes and JSON logs.
    #[arg(long, global = true, help = "Emit JSON envelope regardless of format")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the dependency tree, conflicts and cycles of a repository.
    #[command(about = "Analyze the dependencies of a repository")]
    Analyze(AnalyzeArgs),
    /// Cycle detection over workspace packages only.
    #[command(about = "Detect circular dependencies between workspace packages")]
    Cycles(CyclesArgs),
    /// Resolution cache maintenance.
    #[command(about = "Inspect and maintain the resolution caches")]
    Cache {
        /// Cache subcommand.
        #[command(subcommand)]
        subcommand: CacheCommands,
    },
}

/// Where the repository is and how it is configured.
#[derive(Args, Debug, Clone, Default)]
pub struct RepositoryArgs {
    /// Repository root.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Configuration file; `<PATH>/monodep.toml` when absent.
    #[arg(long, short = 'c', env = "MONODEP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// `monodep analyze`
#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Repository and configuration.
    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Answer registry lookups from this JSON fixture.
    #[arg(long, env = "MONODEP_REGISTRY_FIXTURE")]
    pub registry_fixture: Option<PathBuf>,

    /// Registry base URL.
    #[arg(long, env = "MONODEP_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Deepest dependency level resolved.
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Registry calls in flight at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Bound on each registry call, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Skip `devDependencies` of workspace packages.
    #[arg(long)]
    pub no_dev: bool,

    /// Follow `peerDependencies` of workspace packages.
    #[arg(long)]
    pub include_peer: bool,

    /// Record fixes for low-risk conflicts.
    #[arg(long)]
    pub auto_resolve: bool,

    /// Neither read nor write the resolution caches.
    #[arg(long, env = "MONODEP_NO_CACHE")]
    pub no_cache: bool,

    /// Exit with 1 when any of these are found.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub fail_on: Vec<Finding>,

    /// Output format.
    #[arg(long = "format", short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

/// `monodep cycles`
#[derive(Args, Debug, Clone, Default)]
pub struct CyclesArgs {
    /// Repository and configuration.
    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Count `devDependencies` as graph edges.
    #[arg(long)]
    pub include_dev: bool,

    /// Exit with 1 when a cycle is found.
    #[arg(long)]
    pub strict: bool,

    /// Output format.
    #[arg(long = "format", short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

/// What `--fail-on` can check.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum Finding {
    /// Circular dependencies between workspace packages.
    Cycles,
    /// Version conflicts left unresolved.
    Conflicts,
    /// Skipped manifests or unresolved subtrees.
    Incomplete,
}

/// Which resolution cache a command applies to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum, Default)]
pub enum CacheNamespace {
    /// Resolved registry subtrees.
    Nodes,
    /// Whole trees.
    Trees,
    /// Both.
    #[default]
    All,
}

/// Options shared by every cache subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CacheArgs {
    /// Repository and configuration.
    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Cache to operate on.
    #[arg(long, value_enum, default_value_t = CacheNamespace::All)]
    pub namespace: CacheNamespace,

    /// Cache base directory.
    #[arg(long, env = "MONODEP_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Output format.
    #[arg(long = "format", short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

/// `monodep cache ...`
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Entry counts, sizes and hit rates.
    #[command(about = "Show cache statistics")]
    Stats(CacheArgs),
    /// Drop every entry.
    #[command(about = "Remove every cached entry")]
    Clear(CacheArgs),
    /// Purge expired and invalidated entries.
    #[command(about = "Purge expired entries and rewrite snapshots")]
    Maintain(CacheArgs),
    /// Drop every entry computed from one input digest.
    #[command(about = "Invalidate entries computed from an input hash")]
    Invalidate {
        /// Input digest, as reported in `tree.metadata.input_hash`.
        hash: String,
        /// Shared cache options.
        #[command(flatten)]
        args: CacheArgs,
    },
}

/// Parse the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::{LogLevel, TracingFormat};
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["monodep", "analyze"]).unwrap();
        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.log_format, TracingFormat::Pretty);
        assert!(!cli.json);

        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.repository.path, PathBuf::from("."));
        assert_eq!(args.output_format, OutputFormat::Text);
        assert!(args.fail_on.is_empty());
        assert!(args.max_depth.is_none());
    }

    #[test]
    fn test_analyze_options() {
        let cli = Cli::try_parse_from([
            "monodep",
            "--level",
            "debug",
            "analyze",
            "repo",
            "--max-depth",
            "3",
            "--no-cache",
            "--fail-on",
            "cycles,conflicts",
            "-f",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.level, LogLevel::Debug);

        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.repository.path, PathBuf::from("repo"));
        assert_eq!(args.max_depth, Some(3));
        assert!(args.no_cache);
        assert_eq!(args.fail_on, vec![Finding::Cycles, Finding::Conflicts]);
        assert_eq!(args.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["monodep", "cycles", "--json", "-L", "error"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.level, LogLevel::Error);
    }

    #[test]
    fn test_cache_invalidate_takes_a_hash() {
        let cli = Cli::try_parse_from([
            "monodep",
            "cache",
            "invalidate",
            "abc123",
            "--namespace",
            "trees",
        ])
        .unwrap();
        let Commands::Cache {
            subcommand: CacheCommands::Invalidate { hash, args },
        } = cli.command
        else {
            panic!("expected cache invalidate");
        };
        assert_eq!(hash, "abc123");
        assert_eq!(args.namespace, CacheNamespace::Trees);

        assert!(Cli::try_parse_from(["monodep", "cache", "invalidate"]).is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["monodep"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("bad")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::analysis("bad")), EXIT_ANALYSIS);
        assert_eq!(exit_code_for(&CliError::Interrupted), EXIT_SIGINT);
    }

    #[test]
    fn test_config_errors_map_to_config() {
        let err: CliError = monodep_analyzer::Error::ConfigMissing {
            path: PathBuf::from("missing.toml"),
        }
        .into();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }
}
