//! `monodep analyze`

use super::{CommandOutput, load_config, render};
use crate::cli::{AnalyzeArgs, CliError, EXIT_FINDINGS, EXIT_OK, Finding};
use monodep_analyzer::{AnalysisReport, Analyzer, AnalyzerConfig};
use std::fmt::{self, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Analyze the repository named by `args`.
///
/// # Errors
///
/// See [`Analyzer::analyze`].
#[tracing::instrument(skip_all, fields(path = %args.repository.path.display()))]
pub async fn execute(
    args: AnalyzeArgs,
    json_mode: bool,
    cancel: CancellationToken,
) -> Result<CommandOutput, CliError> {
    let mut config = load_config(&args.repository)?;
    apply_overrides(&mut config, &args);

    let analyzer = Analyzer::new(config)?;
    let maintenance_cancel = cancel.child_token();
    let maintenance = analyzer.spawn_cache_maintenance(&maintenance_cancel);

    let result = analyzer.analyze(&args.repository.path, cancel).await;

    maintenance_cancel.cancel();
    for handle in maintenance {
        if let Err(e) = handle.await {
            tracing::warn!("Cache maintenance task failed: {e}");
        }
    }
    let report = result?;

    let found = findings(&report, &args.fail_on);
    if !found.is_empty() {
        tracing::info!(?found, "Failing on findings");
    }
    let text = render(&report, args.output_format, json_mode, |out| {
        write_report(out, &report)
    })?;

    Ok(CommandOutput {
        text,
        exit_code: if found.is_empty() { EXIT_OK } else { EXIT_FINDINGS },
    })
}

/// Command-line flags win over the configuration file.
pub fn apply_overrides(config: &mut AnalyzerConfig, args: &AnalyzeArgs) {
    if let Some(fixture) = &args.registry_fixture {
        config.registry.fixture = Some(fixture.clone());
    }
    if let Some(url) = &args.registry_url {
        config.registry.http.url.clone_from(url);
    }
    if let Some(max_depth) = args.max_depth {
        config.build.max_depth = max_depth;
    }
    if let Some(concurrency) = args.concurrency {
        config.build.concurrency_level = concurrency.max(1);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.build.package_timeout = Duration::from_millis(timeout_ms);
    }
    if args.no_dev {
        config.build.include_dev_dependencies = false;
    }
    if args.include_peer {
        config.build.include_peer_dependencies = true;
    }
    if args.auto_resolve {
        config.build.auto_resolve_conflicts = true;
    }
    if args.no_cache {
        config.build.use_cache = false;
    }
}

/// The requested findings present in `report`.
#[must_use]
pub fn findings(report: &AnalysisReport, requested: &[Finding]) -> Vec<Finding> {
    let mut found: Vec<Finding> = requested
        .iter()
        .copied()
        .filter(|finding| match finding {
            Finding::Cycles => !report.cycles.cycles.is_empty(),
            Finding::Conflicts => report
                .tree
                .conflicts
                .iter()
                .any(|c| c.applied_resolution.is_none()),
            Finding::Incomplete => !report.degradation.complete,
        })
        .collect();
    found.dedup();
    found
}

fn write_report(out: &mut String, report: &AnalysisReport) -> fmt::Result {
    let summary = report.summary();
    writeln!(
        out,
        "Analyzed {} in {}ms",
        report.root.display(),
        report.duration_ms
    )?;
    writeln!(out, "  workspaces           {}", summary.workspaces)?;
    writeln!(out, "  packages             {}", summary.packages)?;
    writeln!(out, "  unique dependencies  {}", summary.unique_dependencies)?;
    writeln!(
        out,
        "  conflicts            {} ({} auto-resolved)",
        summary.conflicts, summary.auto_resolved_conflicts
    )?;
    writeln!(out, "  cycles               {}", summary.cycles)?;
    writeln!(out, "  health score         {}/100", summary.health_score)?;
    if report.tree.metadata.from_cache {
        writeln!(out, "  tree served from cache")?;
    }

    if !report.tree.conflicts.is_empty() {
        writeln!(out, "\nConflicts:")?;
        for conflict in &report.tree.conflicts {
            let versions: Vec<String> = conflict
                .conflict
                .versions
                .iter()
                .map(ToString::to_string)
                .collect();
            write!(
                out,
                "  {}: {} ({}, {} risk)",
                conflict.conflict.package_name,
                versions.join(", "),
                conflict.conflict.conflict_type,
                conflict.conflict.risk.level,
            )?;
            if let Some(applied) = &conflict.applied_resolution {
                write!(out, " -> {} via {}", applied.target, applied.strategy)?;
            } else if let Some(best) = conflict.resolution_options.first() {
                write!(out, ", consider {} ({})", best.target, best.strategy)?;
            }
            writeln!(out)?;
        }
    }

    super::cycles::write_cycles(out, &report.cycles)?;

    let degradation = &report.degradation;
    if !degradation.complete {
        writeln!(out, "\nIncomplete:")?;
        for skipped in degradation
            .skipped_manifests
            .iter()
            .chain(&degradation.skipped_configurations)
        {
            writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.reason)?;
        }
        if degradation.unresolved_subtrees > 0 {
            writeln!(
                out,
                "  {} dependencies left unresolved",
                degradation.unresolved_subtrees
            )?;
        }
        if degradation.failed_roots > 0 {
            writeln!(out, "  {} packages failed to resolve", degradation.failed_roots)?;
        }
        for failure in report.tree.failures.iter().take(10) {
            writeln!(
                out,
                "  {}@{}: {}",
                failure.package, failure.requested_range, failure.message
            )?;
        }
    }
    if degradation.truncated_subtrees > 0 {
        writeln!(
            out,
            "\n{} subtrees cut at the depth limit",
            degradation.truncated_subtrees
        )?;
    }
    Ok(())
}
