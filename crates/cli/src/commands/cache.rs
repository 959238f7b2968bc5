//! `monodep cache`

use super::{CommandOutput, load_config, render};
use crate::cli::{CacheArgs, CacheCommands, CacheNamespace, CliError, EXIT_OK};
use monodep_analyzer::{NODE_CACHE_NAMESPACE, TREE_CACHE_NAMESPACE};
use monodep_cache::{CacheConfig, CacheStats, MaintenanceReport, ResolutionCache};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Entries are handled as raw JSON; both namespaces share one type.
type RawCache = ResolutionCache<serde_json::Value>;

/// Entries removed from one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removed {
    /// Cache namespace.
    pub namespace: String,
    /// Entries dropped.
    pub removed: usize,
}

/// Result of a maintenance pass over one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintained {
    /// Cache namespace.
    pub namespace: String,
    /// What the pass did.
    pub report: MaintenanceReport,
}

/// Run a cache subcommand.
///
/// # Errors
///
/// Fails when persistence is disabled or a cache directory is unusable.
pub fn execute(command: CacheCommands, json_mode: bool) -> Result<CommandOutput, CliError> {
    let text = match command {
        CacheCommands::Stats(args) => {
            let stats: Vec<CacheStats> = open_caches(&args)?.iter().map(RawCache::stats).collect();
            render(&stats, args.output_format, json_mode, |out| {
                write_stats(out, &stats)
            })?
        }
        CacheCommands::Clear(args) => {
            let removed = open_caches(&args)?
                .iter()
                .map(|cache| {
                    cache.clear().map(|removed| Removed {
                        namespace: cache.namespace().to_string(),
                        removed,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            render(&removed, args.output_format, json_mode, |out| {
                write_removed(out, &removed, "cleared")
            })?
        }
        CacheCommands::Maintain(args) => {
            let maintained: Vec<Maintained> = open_caches(&args)?
                .iter()
                .map(|cache| Maintained {
                    namespace: cache.namespace().to_string(),
                    report: cache.run_maintenance(),
                })
                .collect();
            render(&maintained, args.output_format, json_mode, |out| {
                for m in &maintained {
                    writeln!(
                        out,
                        "{}: {} expired, {} invalidated, {} files removed, {} entries snapshotted",
                        m.namespace,
                        m.report.expired,
                        m.report.invalidated,
                        m.report.files_removed,
                        m.report.snapshot_entries
                    )?;
                }
                Ok(())
            })?
        }
        CacheCommands::Invalidate { hash, args } => {
            let invalidated: Vec<Removed> = open_caches(&args)?
                .iter()
                .map(|cache| Removed {
                    namespace: cache.namespace().to_string(),
                    removed: cache.invalidate(&hash),
                })
                .collect();
            render(&invalidated, args.output_format, json_mode, |out| {
                write_removed(out, &invalidated, "invalidated")
            })?
        }
    };
    Ok(CommandOutput {
        text,
        exit_code: EXIT_OK,
    })
}

/// The on-disk store the analyzer would use for `args`.
fn store_config(args: &CacheArgs) -> Result<CacheConfig, CliError> {
    let mut store = load_config(&args.repository)?.cache.store;
    if let Some(directory) = &args.cache_dir {
        store.directory = Some(directory.clone());
    }
    if !store.persist {
        return Err(CliError::config_with_help(
            "Cache persistence is disabled",
            "Set `persist = true` in the [cache] section to keep resolutions on disk",
        ));
    }
    Ok(store)
}

fn open_caches(args: &CacheArgs) -> Result<Vec<RawCache>, CliError> {
    let store = store_config(args)?;
    let namespaces: &[&str] = match args.namespace {
        CacheNamespace::Nodes => &[NODE_CACHE_NAMESPACE],
        CacheNamespace::Trees => &[TREE_CACHE_NAMESPACE],
        CacheNamespace::All => &[NODE_CACHE_NAMESPACE, TREE_CACHE_NAMESPACE],
    };
    namespaces
        .iter()
        .map(|namespace| RawCache::open(store.clone(), *namespace).map_err(CliError::from))
        .collect()
}

fn write_stats(out: &mut String, stats: &[CacheStats]) -> fmt::Result {
    for s in stats {
        writeln!(out, "{}", s.namespace)?;
        if let Some(directory) = &s.directory {
            writeln!(out, "  directory    {}", directory.display())?;
        }
        writeln!(out, "  hot          {}", s.hot_entries)?;
        writeln!(out, "  warm         {}", s.warm_entries)?;
        writeln!(out, "  cold         {} ({} bytes)", s.cold_entries, s.cold_bytes)?;
        writeln!(out, "  invalidated  {}", s.invalidated_entries)?;
    }
    Ok(())
}

fn write_removed(out: &mut String, removed: &[Removed], verb: &str) -> fmt::Result {
    for r in removed {
        writeln!(out, "{}: {} {verb}", r.namespace, r.removed)?;
    }
    Ok(())
}
