//! Filesystem helpers shared by configuration and package discovery.
//!
//! - [`resolve_glob_patterns`] expands workspace member patterns to directories
//! - [`read_json_file`] / [`read_yaml_file`] attach the file path to parse errors

pub mod configs;
pub mod manifest;

use crate::error::{Error, Result};
use crate::types::DiscoveryOptions;
use glob::{MatchOptions, Pattern};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn compile(pattern: &str) -> Result<Pattern> {
    let normalized = pattern.trim().trim_start_matches("./").trim_end_matches('/');
    Pattern::new(normalized).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// How deep a walk has to go to satisfy every pattern, `None` when unbounded.
fn required_depth(patterns: &[Pattern]) -> Option<usize> {
    patterns
        .iter()
        .map(|p| {
            let text = p.as_str();
            if text.contains("**") {
                None
            } else {
                Some(text.split('/').filter(|c| !c.is_empty()).count())
            }
        })
        .try_fold(0, |max, depth| depth.map(|d| max.max(d)))
}

/// Resolves glob patterns to directories under `root`.
///
/// `*` matches within one path component, `**` across components, and
/// entries starting with `!` exclude. Directories named in
/// [`DiscoveryOptions::ignored_dirs`] are pruned and never descended into.
///
/// Returns sorted, unique, absolute paths.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if a pattern does not compile.
pub fn resolve_glob_patterns(
    root: &Path,
    patterns: &[String],
    options: &DiscoveryOptions,
) -> Result<Vec<PathBuf>> {
    let mut inclusion_patterns = Vec::new();
    let mut exclusion_patterns = Vec::new();

    for p in patterns {
        if let Some(stripped) = p.trim().strip_prefix('!') {
            exclusion_patterns.push(compile(stripped)?);
        } else {
            inclusion_patterns.push(compile(p)?);
        }
    }

    if inclusion_patterns.is_empty() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if let Some(depth) = required_depth(&inclusion_patterns) {
        walker = walker.max_depth(depth);
    }

    let mut matched_paths = BTreeSet::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || !options.is_ignored(&e.file_name().to_string_lossy())
        })
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            continue;
        }

        let Ok(rel_path) = entry.path().strip_prefix(root) else {
            continue;
        };

        let is_excluded = exclusion_patterns
            .iter()
            .any(|p| p.matches_path_with(rel_path, MATCH_OPTIONS));
        if is_excluded {
            continue;
        }

        let is_included = inclusion_patterns
            .iter()
            .any(|p| p.matches_path_with(rel_path, MATCH_OPTIONS));
        if is_included {
            matched_paths.insert(entry.path().to_path_buf());
        }
    }

    Ok(matched_paths.into_iter().collect())
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed as valid JSON.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::Io {
        source: e,
        path: Some(path.to_path_buf()),
        operation: "reading json file".to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| Error::Json {
        source: e,
        path: Some(path.to_path_buf()),
    })
}

/// Reads and parses a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed as valid YAML.
pub fn read_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::Io {
        source: e,
        path: Some(path.to_path_buf()),
        operation: "reading yaml file".to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| Error::Yaml {
        source: e,
        path: Some(path.to_path_buf()),
    })
}
