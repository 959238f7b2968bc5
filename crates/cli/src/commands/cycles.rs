//! `monodep cycles`

use super::{CommandOutput, load_config, render};
use crate::cli::{CliError, CyclesArgs, EXIT_FINDINGS, EXIT_OK};
use monodep_analyzer::{CycleCheck, check_cycles};
use monodep_cycles::{CycleAnalysis, Effort};
use std::fmt::{self, Write};

/// Detect cycles between the workspace packages named by `args`.
///
/// # Errors
///
/// See [`check_cycles`].
pub async fn execute(args: CyclesArgs, json_mode: bool) -> Result<CommandOutput, CliError> {
    let mut config = load_config(&args.repository)?;
    if args.include_dev {
        config.health.include_dev_dependencies = true;
    }

    let root = args.repository.path.clone();
    let check = tokio::task::spawn_blocking(move || check_cycles(&config, &root))
        .await
        .map_err(|e| CliError::analysis(format!("Cycle check task failed: {e}")))??;

    let exit_code = if args.strict && !check.cycles.cycles.is_empty() {
        EXIT_FINDINGS
    } else {
        EXIT_OK
    };
    let text = render(&check, args.output_format, json_mode, |out| {
        write_check(out, &check)
    })?;
    Ok(CommandOutput { text, exit_code })
}

fn write_check(out: &mut String, check: &CycleCheck) -> fmt::Result {
    writeln!(
        out,
        "{} packages under {}, health score {}/100",
        check.packages,
        check.root.display(),
        check.cycles.health_score
    )?;
    for skipped in &check.skipped_manifests {
        writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.reason)?;
    }
    if check.cycles.cycles.is_empty() {
        writeln!(out, "No circular dependencies")?;
        if let Some(order) = &check.cycles.build_order {
            writeln!(out, "Build order: {}", order.join(", "))?;
        }
        return Ok(());
    }
    write_cycles(out, &check.cycles)
}

const fn effort_label(effort: Effort) -> &'static str {
    match effort {
        Effort::Low => "low",
        Effort::Medium => "medium",
        Effort::High => "high",
    }
}

/// One block per cycle; nothing when there are none.
pub(crate) fn write_cycles(out: &mut String, analysis: &CycleAnalysis) -> fmt::Result {
    if analysis.cycles.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nCycles:")?;
    for cycle in &analysis.cycles {
        writeln!(
            out,
            "  {} (length {}, {} effort, ~{}h)",
            cycle.path(),
            cycle.length,
            effort_label(cycle.impact.effort),
            cycle.impact.estimated_hours
        )?;
        if let Some(point) = cycle.recommended_break_point() {
            writeln!(
                out,
                "    break {} -> {} ({} risk): {}",
                point.from, point.to, point.risk, point.rationale
            )?;
        }
        writeln!(
            out,
            "    affects {}",
            cycle.impact.affected_packages.join(", ")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monodep_cycles::{CircularDetector, PackageGraph};
    use monodep_workspaces::PackageKind;

    fn ring() -> CycleAnalysis {
        let mut graph = PackageGraph::new();
        graph.add_package("a", PackageKind::Library);
        graph.add_package("b", PackageKind::Library);
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "a").unwrap();
        CircularDetector::default().analyze(&graph)
    }

    #[test]
    fn test_cycles_are_listed_with_a_break_point() {
        let mut out = String::new();
        write_cycles(&mut out, &ring()).unwrap();
        assert!(out.contains("a -> b -> a (length 2, low effort"));
        assert!(out.contains("break "));
    }

    #[test]
    fn test_no_cycles_prints_nothing() {
        let mut out = String::new();
        write_cycles(&mut out, &CircularDetector::default().analyze(&PackageGraph::new()))
            .unwrap();
        assert!(out.is_empty());
    }
}
