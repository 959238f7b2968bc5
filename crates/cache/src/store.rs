//! The three-tier resolution cache.
//!
//! - **hot**: small map of recently used entries behind a `RwLock`
//! - **warm**: larger bounded map behind a `Mutex`, snapshotted to disk
//! - **cold**: one JSON file per key under the cache directory
//!
//! Reads fall through hot, warm and cold, promoting what they find. Writes
//! go to hot and warm synchronously and to disk in the background. Whenever
//! both in-memory tiers are locked together the hot lock is taken first.

use crate::entry::{CachedResolution, EntryHeader};
use crate::metrics::{CacheMetrics, MetricsSnapshot, Tier};
use crate::root::cache_root;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use monodep_recovery::{ErrorContext, ErrorHandler};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

const SNAPSHOT_FILE: &str = "warm-snapshot.json";
const ENTRY_EXTENSION: &str = "json";
const WRITE_WAIT_LIMIT: std::time::Duration = std::time::Duration::from_secs(5);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity, expiry and persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries in the hot tier.
    pub hot_capacity: usize,
    /// Maximum entries in the warm tier.
    pub warm_capacity: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Base directory for the cold tier; the machine cache dir when unset.
    pub directory: Option<PathBuf>,
    /// Whether the cold tier is used at all.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: 256,
            warm_capacity: 4_096,
            ttl_secs: 24 * 60 * 60,
            directory: None,
            persist: true,
        }
    }
}

/// What a maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// In-memory entries dropped because they expired.
    pub expired: usize,
    /// In-memory entries dropped because they were invalidated.
    pub invalidated: usize,
    /// Files deleted from the cold tier.
    pub files_removed: usize,
    /// Entries written to the warm snapshot.
    pub snapshot_entries: usize,
}

/// Sizes and counters of a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Namespace the cache was opened with.
    pub namespace: String,
    /// Entries in the hot tier.
    pub hot_entries: usize,
    /// Entries in the warm tier.
    pub warm_entries: usize,
    /// In-memory entries marked invalid but not yet purged.
    pub invalidated_entries: usize,
    /// Entry files in the cold tier.
    pub cold_entries: usize,
    /// Bytes used by the cold tier.
    pub cold_bytes: u64,
    /// Cold tier directory.
    pub directory: Option<PathBuf>,
    /// Counters at the time of the call.
    pub metrics: MetricsSnapshot,
    /// See [`MetricsSnapshot::hit_rate`].
    pub hit_rate: f64,
    /// See [`MetricsSnapshot::hot_hit_rate`].
    pub hot_hit_rate: f64,
}

/// A thread-safe, three-tier cache of resolution results.
pub struct ResolutionCache<T> {
    namespace: String,
    config: CacheConfig,
    ttl: chrono::Duration,
    directory: Option<PathBuf>,
    hot: RwLock<HashMap<String, CachedResolution<T>>>,
    warm: Mutex<HashMap<String, CachedResolution<T>>>,
    invalidated_hashes: Arc<Mutex<HashSet<String>>>,
    pending_writes: Arc<AtomicUsize>,
    metrics: CacheMetrics,
    error_handler: Option<Arc<ErrorHandler>>,
    /// Problems met by `open` before a handler could be attached.
    unreported: Vec<(Error, PathBuf)>,
}

impl<T> std::fmt::Debug for ResolutionCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("namespace", &self.namespace)
            .field("directory", &self.directory)
            .field("hot_entries", &self.hot.read().len())
            .field("warm_entries", &self.warm.lock().len())
            .finish_non_exhaustive()
    }
}

enum Lookup<T> {
    Hit(T),
    Invalidated,
    Expired,
    Absent,
}

/// Classify `key` without touching the entry.
fn peek<T: Clone>(
    map: &HashMap<String, CachedResolution<T>>,
    key: &str,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> Lookup<CachedResolution<T>> {
    let Some(entry) = map.get(key) else {
        return Lookup::Absent;
    };
    if entry.invalidated {
        return Lookup::Invalidated;
    }
    if entry.is_expired_at(ttl, now) {
        return Lookup::Expired;
    }
    Lookup::Hit(entry.clone())
}

/// Count an access to `key`, or drop it if it has expired meanwhile.
fn touch<T>(
    map: &mut HashMap<String, CachedResolution<T>>,
    key: &str,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) {
    let expired = match map.get_mut(key) {
        Some(entry) if !entry.is_expired_at(ttl, now) => {
            entry.access_count += 1;
            false
        }
        Some(_) => true,
        None => false,
    };
    if expired {
        map.remove(key);
    }
}

fn lookup<T: Clone>(
    map: &mut HashMap<String, CachedResolution<T>>,
    key: &str,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> Lookup<CachedResolution<T>> {
    let Some(entry) = map.get_mut(key) else {
        return Lookup::Absent;
    };
    if entry.invalidated {
        return Lookup::Invalidated;
    }
    if entry.is_expired_at(ttl, now) {
        map.remove(key);
        return Lookup::Expired;
    }
    entry.access_count += 1;
    Lookup::Hit(entry.clone())
}

/// Remove entries until there is room for one more, oldest first, least
/// accessed among equally old.
fn make_room<T>(map: &mut HashMap<String, CachedResolution<T>>, capacity: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while !map.is_empty() && map.len() >= capacity.max(1) {
        let victim = map
            .values()
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.access_count.cmp(&b.access_count))
            })
            .map(|e| e.key.clone());
        let Some(victim) = victim else { break };
        map.remove(&victim);
        evicted.push(victim);
    }
    evicted
}

/// File name for a key; keys outside `[A-Za-z0-9_-]` are hashed.
fn entry_file_name(key: &str) -> String {
    let safe = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        format!("{key}.{ENTRY_EXTENSION}")
    } else {
        let mut hasher = crate::InputHasher::new();
        hasher.update(key);
        format!("{}.{ENTRY_EXTENSION}", hasher.finish())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
    }
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{n}.tmp", std::process::id()));
    fs::write(&tmp, bytes).map_err(|e| Error::io(e, &tmp, "write"))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(e, path, "rename")
    })
}

fn remove_file_if_exists(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to remove cache file {}: {e}", path.display());
            false
        }
    }
}

impl<T> ResolutionCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// A cache without a cold tier.
    #[must_use]
    pub fn in_memory(config: CacheConfig, namespace: impl Into<String>) -> Self {
        let ttl = chrono::Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(i64::MAX));
        Self {
            namespace: namespace.into(),
            config,
            ttl,
            directory: None,
            hot: RwLock::new(HashMap::new()),
            warm: Mutex::new(HashMap::new()),
            invalidated_hashes: Arc::new(Mutex::new(HashSet::new())),
            pending_writes: Arc::new(AtomicUsize::new(0)),
            metrics: CacheMetrics::default(),
            error_handler: None,
            unreported: Vec::new(),
        }
    }

    /// Report unreadable or corrupt disk entries to `handler`, including
    /// any met while opening.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        for (error, path) in std::mem::take(&mut self.unreported) {
            handler.handle(&error, Self::context(&self.namespace, &path));
        }
        self.error_handler = Some(handler);
        self
    }

    fn context(namespace: &str, path: &Path) -> ErrorContext {
        ErrorContext::new("read_cache_entry")
            .with_path(path)
            .with_detail("namespace", namespace)
    }

    /// Log a disk problem and forward it to the handler, if any.
    fn report(&self, error: &Error, path: &Path) {
        self.metrics.record_disk_error();
        tracing::warn!(namespace = %self.namespace, "{error}");
        if let Some(handler) = &self.error_handler {
            handler.handle(error, Self::context(&self.namespace, path));
        }
    }

    /// Open a cache, with a cold tier under `<directory>/<namespace>` when
    /// persistence is enabled. A warm snapshot left by a previous run is
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be determined or
    /// created.
    pub fn open(config: CacheConfig, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if !config.persist {
            return Ok(Self::in_memory(config, namespace));
        }

        let base = match &config.directory {
            Some(dir) => dir.clone(),
            None => cache_root()?,
        };
        let directory = base.join(&namespace);
        fs::create_dir_all(&directory).map_err(|e| Error::io(e, &directory, "create_dir_all"))?;

        let mut cache = Self::in_memory(config, namespace);
        cache.directory = Some(directory);
        let loaded = match cache.load_snapshot() {
            Ok(loaded) => loaded,
            Err((error, path)) => {
                cache.metrics.record_disk_error();
                tracing::warn!(namespace = %cache.namespace, "{error}; removing it");
                cache.unreported.push((error, path));
                0
            }
        };
        tracing::debug!(
            namespace = %cache.namespace,
            loaded,
            "Opened resolution cache"
        );
        Ok(cache)
    }

    /// Namespace given at construction.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cold tier directory, if any.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Live counters.
    #[must_use]
    pub const fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join(entry_file_name(key)))
    }

    /// Fetch a servable value.
    ///
    /// Expired and invalidated entries are never returned. An invalidated
    /// in-memory entry answers the read without consulting the disk.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Utc::now();

        // Readers share the hot lock; only hits and expiries take it for writing.
        let hot = peek(&self.hot.read(), key, self.ttl, now);
        match hot {
            Lookup::Hit(entry) => {
                touch(&mut self.hot.write(), key, self.ttl, now);
                self.metrics.record_hit(Tier::Hot);
                return Some(entry.result);
            }
            Lookup::Invalidated => {
                self.metrics.record_miss();
                return None;
            }
            Lookup::Expired => touch(&mut self.hot.write(), key, self.ttl, now),
            Lookup::Absent => {}
        }

        let warm = lookup(&mut self.warm.lock(), key, self.ttl, now);
        match warm {
            Lookup::Hit(entry) => {
                self.metrics.record_hit(Tier::Warm);
                let result = entry.result.clone();
                self.insert_hot(entry);
                return Some(result);
            }
            Lookup::Invalidated => {
                self.metrics.record_miss();
                return None;
            }
            Lookup::Expired | Lookup::Absent => {}
        }

        if let Some(entry) = self.read_cold(key, now) {
            self.metrics.record_hit(Tier::Cold);
            let result = entry.result.clone();
            self.promote(entry);
            return Some(result);
        }

        self.metrics.record_miss();
        None
    }

    fn read_cold(&self, key: &str, now: DateTime<Utc>) -> Option<CachedResolution<T>> {
        let path = self.entry_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.report(&Error::io(e, &path, "read"), &path);
                return None;
            }
        };

        let mut entry: CachedResolution<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                self.report(&Error::corrupt(key, e.to_string()), &path);
                remove_file_if_exists(&path);
                return None;
            }
        };

        let revoked = self.invalidated_hashes.lock().contains(&entry.input_hash);
        if revoked || !entry.is_servable_at(self.ttl, now) {
            remove_file_if_exists(&path);
            return None;
        }

        entry.access_count += 1;
        Some(entry)
    }

    /// Place an entry in warm and hot, evicting as needed.
    fn promote(&self, entry: CachedResolution<T>) {
        let evicted = self.insert_warm(entry.clone());
        self.insert_hot(entry);
        if !evicted.is_empty() {
            let mut hot = self.hot.write();
            for key in &evicted {
                hot.remove(key);
            }
        }
    }

    fn insert_warm(&self, entry: CachedResolution<T>) -> Vec<String> {
        let mut warm = self.warm.lock();
        let evicted = if warm.contains_key(&entry.key) {
            Vec::new()
        } else {
            make_room(&mut warm, self.config.warm_capacity)
        };
        warm.insert(entry.key.clone(), entry);
        drop(warm);

        if !evicted.is_empty() {
            self.metrics.record_evictions(evicted.len());
            tracing::debug!(namespace = %self.namespace, count = evicted.len(), "Evicted warm entries");
        }
        evicted
    }

    fn insert_hot(&self, entry: CachedResolution<T>) {
        let mut hot = self.hot.write();
        if !hot.contains_key(&entry.key) {
            make_room(&mut hot, self.config.hot_capacity);
        }
        hot.insert(entry.key.clone(), entry);
    }

    /// Store a value computed from inputs digesting to `input_hash`.
    ///
    /// The disk write happens in the background; failures are logged.
    pub fn set(&self, key: impl Into<String>, value: T, input_hash: impl Into<String>) {
        let entry = CachedResolution::new(key, value, input_hash);
        self.invalidated_hashes.lock().remove(&entry.input_hash);
        self.persist_in_background(&entry);
        self.promote(entry);
        self.metrics.record_write();
    }

    fn persist_in_background(&self, entry: &CachedResolution<T>) {
        let Some(path) = self.entry_path(&entry.key) else {
            return;
        };
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.record_disk_error();
                tracing::warn!("Failed to encode cache entry {}: {e}", entry.key);
                return;
            }
        };

        // A write racing an invalidation of its hash is dropped: the rename
        // happens under the same lock `invalidate` takes before scanning.
        let revoked = Arc::clone(&self.invalidated_hashes);
        let pending = Arc::clone(&self.pending_writes);
        let input_hash = entry.input_hash.clone();
        let write = move || {
            let revoked = revoked.lock();
            if revoked.contains(&input_hash) {
                tracing::debug!("Dropping cache write for invalidated inputs {input_hash}");
            } else if let Err(e) = write_atomic(&path, &bytes) {
                tracing::warn!("Failed to persist cache entry: {e}");
            }
            drop(revoked);
            pending.fetch_sub(1, Ordering::AcqRel);
        };

        self.pending_writes.fetch_add(1, Ordering::AcqRel);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            drop(handle.spawn_blocking(write));
        } else if let Err(e) = std::thread::Builder::new()
            .name("monodep-cache-write".to_string())
            .spawn(write)
        {
            self.pending_writes.fetch_sub(1, Ordering::AcqRel);
            self.metrics.record_disk_error();
            tracing::warn!("Failed to spawn cache writer: {e}");
        }
    }

    /// Block until background writes started so far have finished.
    fn wait_for_writes(&self) {
        let started = std::time::Instant::now();
        while self.pending_writes.load(Ordering::Acquire) > 0 {
            if started.elapsed() >= WRITE_WAIT_LIMIT {
                tracing::warn!(
                    pending = self.pending_writes.load(Ordering::Acquire),
                    "Gave up waiting for background cache writes"
                );
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Wait for background writes, then write every servable in-memory
    /// entry to disk synchronously.
    ///
    /// # Errors
    ///
    /// Returns the first encoding or I/O failure.
    pub fn flush(&self) -> Result<usize> {
        if self.directory.is_none() {
            return Ok(0);
        }
        self.wait_for_writes();
        let now = Utc::now();
        let entries: Vec<CachedResolution<T>> = self
            .warm
            .lock()
            .values()
            .filter(|e| e.is_servable_at(self.ttl, now))
            .cloned()
            .collect();

        for entry in &entries {
            if let Some(path) = self.entry_path(&entry.key) {
                let bytes = serde_json::to_vec(entry)
                    .map_err(|e| Error::encode(entry.key.as_str(), e))?;
                write_atomic(&path, &bytes)?;
            }
        }
        Ok(entries.len())
    }

    /// Invalidate every entry computed from `input_hash`.
    ///
    /// In-memory entries are marked so later reads miss immediately; their
    /// files, and any other file carrying the hash, are deleted. Returns the
    /// number of distinct keys invalidated.
    pub fn invalidate(&self, input_hash: &str) -> usize {
        let mut keys: HashSet<String> = HashSet::new();
        {
            let mut hot = self.hot.write();
            let mut warm = self.warm.lock();
            for entry in hot.values_mut().chain(warm.values_mut()) {
                if entry.input_hash == input_hash && !entry.invalidated {
                    entry.invalidated = true;
                    keys.insert(entry.key.clone());
                }
            }
        }
        self.invalidated_hashes.lock().insert(input_hash.to_string());

        if let Some(directory) = &self.directory {
            for key in &keys {
                if let Some(path) = self.entry_path(key) {
                    remove_file_if_exists(&path);
                }
            }
            for (path, header) in self.scan_headers(directory) {
                if header.input_hash == input_hash && remove_file_if_exists(&path) {
                    keys.insert(header.key);
                }
            }
            if directory.join(SNAPSHOT_FILE).exists()
                && let Err(e) = self.write_snapshot(Utc::now())
            {
                tracing::warn!("Failed to rewrite warm snapshot: {e}");
            }
        }

        self.metrics.record_invalidations(keys.len());
        tracing::debug!(namespace = %self.namespace, input_hash, count = keys.len(), "Invalidated cache entries");
        keys.len()
    }

    fn entry_files(directory: &Path) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(directory) else {
            return Vec::new();
        };
        read_dir
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                    && p.file_name().is_some_and(|name| name != SNAPSHOT_FILE)
            })
            .collect()
    }

    fn scan_headers(&self, directory: &Path) -> Vec<(PathBuf, EntryHeader)> {
        Self::entry_files(directory)
            .into_iter()
            .filter_map(|path| {
                let bytes = fs::read(&path).ok()?;
                let header: EntryHeader = serde_json::from_slice(&bytes).ok()?;
                Some((path, header))
            })
            .collect()
    }

    fn write_snapshot(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(directory) = &self.directory else {
            return Ok(0);
        };
        let entries: Vec<CachedResolution<T>> = self
            .warm
            .lock()
            .values()
            .filter(|e| e.is_servable_at(self.ttl, now))
            .cloned()
            .collect();
        let bytes = serde_json::to_vec(&entries)
            .map_err(|e| Error::encode(SNAPSHOT_FILE, e))?;
        write_atomic(&directory.join(SNAPSHOT_FILE), &bytes)?;
        Ok(entries.len())
    }

    /// Load the warm snapshot. A corrupt snapshot is deleted and returned
    /// as an error with its path.
    fn load_snapshot(&self) -> std::result::Result<usize, (Error, PathBuf)> {
        let Some(path) = self.directory.as_ref().map(|d| d.join(SNAPSHOT_FILE)) else {
            return Ok(0);
        };
        let Ok(bytes) = fs::read(&path) else {
            return Ok(0);
        };
        let mut entries: Vec<CachedResolution<T>> = match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                remove_file_if_exists(&path);
                return Err((Error::corrupt(SNAPSHOT_FILE, e.to_string()), path));
            }
        };

        let now = Utc::now();
        entries.retain(|e| e.is_servable_at(self.ttl, now));
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(self.config.warm_capacity);

        let count = entries.len();
        let mut warm = self.warm.lock();
        for entry in entries {
            warm.insert(entry.key.clone(), entry);
        }
        Ok(count)
    }

    /// Purge expired and invalidated entries, rewrite the warm snapshot and
    /// delete cold files older than the TTL.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let now = Utc::now();
        let mut report = MaintenanceReport::default();

        {
            let mut hot = self.hot.write();
            let mut warm = self.warm.lock();
            hot.retain(|_, e| e.is_servable_at(self.ttl, now));
            warm.retain(|_, e| {
                if e.invalidated {
                    report.invalidated += 1;
                    false
                } else if e.is_expired_at(self.ttl, now) {
                    report.expired += 1;
                    false
                } else {
                    true
                }
            });
        }

        if let Some(directory) = &self.directory {
            match self.write_snapshot(now) {
                Ok(count) => report.snapshot_entries = count,
                Err(e) => {
                    self.metrics.record_disk_error();
                    tracing::warn!("Failed to write warm snapshot: {e}");
                }
            }

            let ttl = self.ttl.to_std().unwrap_or(std::time::Duration::MAX);
            let read_dir = fs::read_dir(directory).into_iter().flatten();
            for file in read_dir.filter_map(std::result::Result::ok) {
                let path = file.path();
                if path.file_name().is_some_and(|name| name == SNAPSHOT_FILE) {
                    continue;
                }
                let stale = file
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .is_some_and(|age| age >= ttl);
                if stale && remove_file_if_exists(&path) {
                    report.files_removed += 1;
                }
            }
        }

        tracing::debug!(namespace = %self.namespace, ?report, "Cache maintenance finished");
        report
    }

    /// Drop every entry from every tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be listed.
    pub fn clear(&self) -> Result<usize> {
        {
            let mut hot = self.hot.write();
            let mut warm = self.warm.lock();
            hot.clear();
            warm.clear();
        }
        let Some(directory) = &self.directory else {
            self.invalidated_hashes.lock().clear();
            return Ok(0);
        };
        self.wait_for_writes();
        self.invalidated_hashes.lock().clear();

        let read_dir = match fs::read_dir(directory) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(e, directory, "read_dir")),
        };
        let removed = read_dir
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .filter(|e| remove_file_if_exists(&e.path()))
            .count();
        tracing::info!(namespace = %self.namespace, removed, "Cleared resolution cache");
        Ok(removed)
    }

    /// Current sizes and counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (hot_entries, warm_entries, invalidated_entries) = {
            let hot = self.hot.read();
            let warm = self.warm.lock();
            let invalidated = warm.values().filter(|e| e.invalidated).count();
            (hot.len(), warm.len(), invalidated)
        };

        let (cold_entries, cold_bytes) = self.directory.as_deref().map_or((0, 0), |dir| {
            let files = Self::entry_files(dir);
            let bytes = files
                .iter()
                .filter_map(|p| fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
            (files.len(), bytes)
        });

        let metrics = self.metrics.snapshot();
        CacheStats {
            namespace: self.namespace.clone(),
            hot_entries,
            warm_entries,
            invalidated_entries,
            cold_entries,
            cold_bytes,
            directory: self.directory.clone(),
            metrics,
            hit_rate: metrics.hit_rate(),
            hot_hit_rate: metrics.hot_hit_rate(),
        }
    }
}

impl<T> ResolutionCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Run [`ResolutionCache::run_maintenance`] every `interval` until
    /// `cancel` fires.
    pub fn spawn_maintenance(
        cache: Arc<Self>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let cache = Arc::clone(&cache);
                        if let Err(e) = tokio::task::spawn_blocking(move || cache.run_maintenance()).await {
                            tracing::warn!("Cache maintenance task failed: {e}");
                        }
                    }
                }
            }
            tracing::debug!("Cache maintenance stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monodep_recovery::ErrorKind;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache: ResolutionCache<String> = ResolutionCache::in_memory(CacheConfig::default(), "t");
        assert_eq!(cache.get("a"), None);
        cache.set("a", "value".to_string(), "h1");
        assert_eq!(cache.get("a").as_deref(), Some("value"));

        let metrics = cache.metrics().snapshot();
        assert_eq!(metrics.hot_hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn test_invalidated_entries_are_never_served() {
        let cache: ResolutionCache<u32> = ResolutionCache::in_memory(CacheConfig::default(), "t");
        cache.set("a", 1, "h1");
        cache.set("b", 2, "h1");
        cache.set("c", 3, "h2");

        assert_eq!(cache.invalidate("h1"), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().invalidated_entries, 2);

        let report = cache.run_maintenance();
        assert_eq!(report.invalidated, 2);
        assert_eq!(cache.stats().warm_entries, 1);
    }

    #[test]
    fn test_set_after_invalidate_serves_new_value() {
        let cache: ResolutionCache<u32> = ResolutionCache::in_memory(CacheConfig::default(), "t");
        cache.set("a", 1, "h1");
        cache.invalidate("h1");
        cache.set("a", 2, "h1");
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_expired_entries_are_never_served() {
        let cache: ResolutionCache<u32> = ResolutionCache::in_memory(
            CacheConfig {
                ttl_secs: 0,
                ..CacheConfig::default()
            },
            "t",
        );
        cache.set("a", 1, "h1");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.run_maintenance().expired, 0);
    }

    #[test]
    fn test_warm_eviction_prefers_oldest() {
        let cache: ResolutionCache<u32> = ResolutionCache::in_memory(
            CacheConfig {
                hot_capacity: 1,
                warm_capacity: 2,
                ..CacheConfig::default()
            },
            "t",
        );
        cache.set("first", 1, "h");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.set("second", 2, "h");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.set("third", 3, "h");

        assert_eq!(cache.get("first"), None);
        assert_eq!(cache.get("second"), Some(2));
        assert_eq!(cache.get("third"), Some(3));
        assert_eq!(cache.metrics().snapshot().evictions, 1);

        let stats = cache.stats();
        assert_eq!(stats.hot_entries, 1);
        assert_eq!(stats.warm_entries, 2);
    }

    #[test]
    fn test_eviction_ties_break_on_access_count() {
        let mut map: HashMap<String, CachedResolution<u32>> = HashMap::new();
        let created_at = Utc::now();
        for (key, hits) in [("busy", 5), ("idle", 0)] {
            let mut entry = CachedResolution::new(key, 0, "h");
            entry.created_at = created_at;
            entry.access_count = hits;
            map.insert(key.to_string(), entry);
        }
        assert_eq!(make_room(&mut map, 2), vec!["idle".to_string()]);
    }

    #[test]
    fn test_cold_tier_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let cache: ResolutionCache<Vec<String>> =
                ResolutionCache::open(config(&dir), "nodes").unwrap();
            cache.set("react", vec!["18.2.0".to_string()], "h1");
            assert_eq!(cache.flush().unwrap(), 1);
        }

        let reopened: ResolutionCache<Vec<String>> = ResolutionCache::open(
            CacheConfig {
                directory: Some(dir.path().to_path_buf()),
                ..CacheConfig::default()
            },
            "nodes",
        )
        .unwrap();
        assert_eq!(reopened.get("react"), Some(vec!["18.2.0".to_string()]));
        assert_eq!(reopened.metrics().snapshot().cold_hits, 1);
        assert_eq!(reopened.get("react"), Some(vec!["18.2.0".to_string()]));
        assert_eq!(reopened.metrics().snapshot().hot_hits, 1);
    }

    #[test]
    fn test_warm_snapshot_is_loaded() {
        let dir = TempDir::new().unwrap();
        {
            let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "trees").unwrap();
            cache.set("tree", 7, "h1");
            assert_eq!(cache.run_maintenance().snapshot_entries, 1);
        }
        let reopened: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "trees").unwrap();
        assert_eq!(reopened.stats().warm_entries, 1);
        assert_eq!(reopened.get("tree"), Some(7));
        assert_eq!(reopened.metrics().snapshot().warm_hits, 1);
    }

    #[test]
    fn test_invalidate_deletes_files() {
        let dir = TempDir::new().unwrap();
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes").unwrap();
        cache.set("a", 1, "h1");
        cache.set("b", 2, "h2");
        cache.flush().unwrap();
        assert_eq!(cache.stats().cold_entries, 2);

        cache.invalidate("h1");
        assert_eq!(cache.stats().cold_entries, 1);

        let reopened: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes").unwrap();
        assert_eq!(reopened.get("a"), None);
        assert_eq!(reopened.get("b"), Some(2));
    }

    #[test]
    fn test_corrupt_file_is_a_miss_and_removed() {
        let dir = TempDir::new().unwrap();
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes").unwrap();
        let path = cache.directory().unwrap().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        assert_eq!(cache.get("broken"), None);
        assert!(!path.exists());
        assert_eq!(cache.metrics().snapshot().disk_errors, 1);
    }

    #[test]
    fn test_corrupt_entry_is_reported_to_the_handler() {
        let dir = TempDir::new().unwrap();
        let handler = Arc::new(ErrorHandler::with_default_strategies(10));
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes")
            .unwrap()
            .with_error_handler(Arc::clone(&handler));
        let path = cache.directory().unwrap().join("react.json");
        fs::write(&path, b"\x00\x01 garbage").unwrap();

        assert_eq!(cache.get("react"), None);
        assert!(!path.exists());
        assert_eq!(cache.metrics().snapshot().misses, 1);

        let history = handler.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, ErrorKind::CacheCorruption);
        assert_eq!(history[0].context.path.as_deref(), Some(path.as_path()));
        assert!(history[0].recovery.is_some());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported_once_a_handler_is_attached() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("trees").join(SNAPSHOT_FILE);
        fs::create_dir_all(snapshot.parent().unwrap()).unwrap();
        fs::write(&snapshot, "[{").unwrap();

        let handler = Arc::new(ErrorHandler::with_default_strategies(10));
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "trees")
            .unwrap()
            .with_error_handler(Arc::clone(&handler));

        assert_eq!(cache.stats().warm_entries, 0);
        assert!(!snapshot.exists());
        let kinds: Vec<ErrorKind> = handler.history().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::CacheCorruption]);
    }

    #[test]
    fn test_hot_hits_count_accesses() {
        let cache: ResolutionCache<u32> = ResolutionCache::in_memory(CacheConfig::default(), "t");
        cache.set("a", 1, "h1");
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.hot.read().get("a").unwrap().access_count, 2);
        assert_eq!(cache.metrics().snapshot().hot_hits, 2);
    }

    #[test]
    fn test_concurrent_readers_share_the_hot_tier() {
        let cache: Arc<ResolutionCache<u32>> =
            Arc::new(ResolutionCache::in_memory(CacheConfig::default(), "t"));
        cache.set("a", 1, "h1");

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || (0..100).all(|_| cache.get("a") == Some(1)))
            })
            .collect();
        assert!(readers.into_iter().all(|r| r.join().unwrap()));
        assert_eq!(cache.metrics().snapshot().hot_hits, 800);
        assert_eq!(cache.hot.read().get("a").unwrap().access_count, 800);
    }

    #[test]
    fn test_unsafe_keys_are_hashed() {
        assert_eq!(entry_file_name("abc123"), "abc123.json");
        let hashed = entry_file_name("../escape");
        assert!(!hashed.contains('/'));
        assert_eq!(hashed.len(), 64 + 5);
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes").unwrap();
        cache.set("a", 1, "h1");
        cache.flush().unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().cold_entries, 0);
    }

    #[tokio::test]
    async fn test_background_write_lands_on_disk() {
        let dir = TempDir::new().unwrap();
        let cache: ResolutionCache<u32> = ResolutionCache::open(config(&dir), "nodes").unwrap();
        cache.set("a", 1, "h1");

        let path = cache.directory().unwrap().join("a.json");
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_maintenance_stops_on_cancel() {
        let cache: Arc<ResolutionCache<u32>> =
            Arc::new(ResolutionCache::in_memory(CacheConfig::default(), "t"));
        let cancel = CancellationToken::new();
        let handle = ResolutionCache::spawn_maintenance(
            Arc::clone(&cache),
            std::time::Duration::from_millis(5),
            cancel.clone(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
