//! Cache directory resolution.

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use std::path::PathBuf;

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "MONODEP_CACHE_DIR";

/// Inputs for determining the cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    override_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) MONODEP_CACHE_DIR
    // 2) XDG_CACHE_HOME/monodep
    // 3) OS cache dir/monodep
    // 4) ~/.monodep/cache
    // 5) TMPDIR/monodep/cache
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs.override_dir.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("monodep"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("monodep"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".monodep/cache"));
    }
    candidates.push(inputs.temp_dir.join("monodep/cache"));

    for path in candidates {
        if path.starts_with("/homeless-shelter") {
            continue;
        }
        // Existing directories may be read-only (CI caches mounted under $HOME).
        if path.exists() {
            let probe = path.join(".write_probe");
            if std::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
                .is_ok()
            {
                let _ = std::fs::remove_file(&probe);
                return Ok(path);
            }
            continue;
        }
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::NoDirectory)
}

fn non_empty_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// The default cache directory for this machine.
///
/// # Errors
///
/// Returns [`Error::NoDirectory`] when no candidate directory is writable.
pub fn cache_root() -> Result<PathBuf> {
    cache_root_from_inputs(CacheInputs {
        override_dir: non_empty_env(CACHE_DIR_ENV),
        xdg_cache_home: non_empty_env("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}
