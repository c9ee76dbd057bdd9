/*!
 * Parsed-tree cache shared by the block parser, assembler and validator.
 *
 * Entries are keyed by a SHA-256 of `(source, filename, mode)` and evicted in
 * least-recently-used order when the entry count or the estimated memory
 * ceiling would be exceeded. Expired entries are purged lazily on lookup and
 * by an optional background sweep. A single mutex guards the map and all
 * counters; parsing itself runs outside the lock.
 */

use log::{debug, warn};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::persistence::{self, EntryRef, PersistedStats, SnapshotRef, FORMAT_VERSION};
use crate::app_config::CacheConfig;
use crate::errors::CacheError;
use crate::python::{self, visit, Module, ParseMode, SyntaxError};

/// Bytes charged per AST node when estimating entry size
const BYTES_PER_NODE: usize = 200;

/// A save is requested after this many insertions
const SAVE_EVERY_INSERTS: usize = 10;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AstCacheConfig {
    pub max_size: usize,
    pub ttl: Option<Duration>,
    pub max_memory_bytes: Option<usize>,
    pub persistence_path: Option<PathBuf>,
    pub compress: bool,
    pub background_sweep: bool,
}

impl Default for AstCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: None,
            max_memory_bytes: None,
            persistence_path: None,
            compress: true,
            background_sweep: true,
        }
    }
}

impl AstCacheConfig {
    /// Settings of the process-wide default instance
    pub fn global_default() -> Self {
        Self {
            max_size: 500,
            ttl: Some(Duration::from_secs(3600)),
            max_memory_bytes: Some(200 * 1024 * 1024),
            ..Self::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    pub fn with_persistence(mut self, path: impl Into<PathBuf>, compress: bool) -> Self {
        self.persistence_path = Some(path.into());
        self.compress = compress;
        self
    }

    /// Sweep interval: a tenth of the TTL, capped at one minute
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.ttl.map(|ttl| (ttl / 10).clamp(Duration::from_millis(10), MAX_SWEEP_INTERVAL))
    }
}

impl From<&CacheConfig> for AstCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size.max(1),
            ttl: config.ttl_seconds.map(Duration::from_secs),
            max_memory_bytes: config.max_memory_mb.map(|mb| (mb as usize) * 1024 * 1024),
            persistence_path: config.persistence_path.clone(),
            compress: config.compress,
            background_sweep: config.enable_background_sweep,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub module: Arc<Module>,
    pub size_estimate: usize,
    pub created_at: SystemTime,
    pub access_count: u64,
    pub last_access: SystemTime,
    tick: u64,
}

/// Snapshot of the cache counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions_capacity: u64,
    pub evictions_ttl: u64,
    pub evictions_memory: u64,
    pub size: usize,
    pub max_size: usize,
    pub memory_bytes: usize,
}

impl CacheStats {
    pub fn evictions(&self) -> u64 {
        self.evictions_capacity + self.evictions_ttl + self.evictions_memory
    }

    /// Hit rate in percent
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 * 100.0 }
    }
}

/// One line of the most-accessed report
#[derive(Debug, Clone, PartialEq)]
pub struct HotEntry {
    pub key: String,
    pub access_count: u64,
    pub size_estimate: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Access tick -> key; the first item is the least recently used
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    memory_bytes: usize,
    stats: CacheStats,
    inserts_since_save: usize,
}

impl CacheState {
    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.bump_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            entry.access_count += 1;
            entry.last_access = SystemTime::now();
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_estimate);
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_estimate);
        }
        true
    }
}

struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct AstCache {
    config: AstCacheConfig,
    state: Mutex<CacheState>,
    save_signal: Arc<Notify>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl std::fmt::Debug for AstCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

fn is_expired(entry: &CacheEntry, ttl: Option<Duration>, now: SystemTime) -> bool {
    match ttl {
        Some(ttl) => now.duration_since(entry.created_at).map(|age| age > ttl).unwrap_or(false),
        None => false,
    }
}

impl AstCache {
    /// Creates the cache and restores persisted entries when a path is configured
    pub fn new(config: AstCacheConfig) -> Self {
        let cache = Self {
            config,
            state: Mutex::new(CacheState::default()),
            save_signal: Arc::new(Notify::new()),
            tasks: Mutex::new(None),
        };
        if cache.config.persistence_path.is_some() {
            if let Err(e) = cache.load() {
                warn!("Ignoring AST cache file: {}", e);
            }
        }
        cache
    }

    pub fn config(&self) -> &AstCacheConfig {
        &self.config
    }

    /// Content-address key of a parse request
    pub fn key(source: &str, filename: &str, mode: ParseMode) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(filename.as_bytes());
        hasher.update([0u8]);
        hasher.update(mode.as_str().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Returns the cached tree or parses and caches it
    pub fn parse(&self, source: &str, filename: &str, mode: ParseMode) -> Result<Arc<Module>, SyntaxError> {
        let key = Self::key(source, filename, mode);
        if let Some(module) = self.get_by_key(&key) {
            return Ok(module);
        }
        let module = Arc::new(python::parse(source, mode)?);
        self.insert(key, module.clone());
        Ok(module)
    }

    pub fn get(&self, source: &str, filename: &str, mode: ParseMode) -> Option<Arc<Module>> {
        self.get_by_key(&Self::key(source, filename, mode))
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<Module>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) => is_expired(entry, self.config.ttl, SystemTime::now()),
        };
        if expired {
            state.remove(key);
            state.stats.evictions_ttl += 1;
            state.stats.misses += 1;
            return None;
        }
        state.touch(key);
        state.stats.hits += 1;
        state.entries.get(key).map(|entry| entry.module.clone())
    }

    pub fn put(&self, source: &str, filename: &str, mode: ParseMode, module: Arc<Module>) {
        self.insert(Self::key(source, filename, mode), module);
    }

    fn insert(&self, key: String, module: Arc<Module>) {
        let size_estimate = visit::node_count(&module) * BYTES_PER_NODE;
        let now = SystemTime::now();
        let entry = CacheEntry {
            module,
            size_estimate,
            created_at: now,
            access_count: 0,
            last_access: now,
            tick: 0,
        };
        let request_save = {
            let mut state = self.state.lock();
            if !self.insert_locked(&mut state, key, entry) {
                return;
            }
            state.inserts_since_save += 1;
            if state.inserts_since_save >= SAVE_EVERY_INSERTS {
                state.inserts_since_save = 0;
                true
            } else {
                false
            }
        };
        if request_save && self.config.persistence_path.is_some() {
            self.save_signal.notify_one();
        }
    }

    /// Memory eviction, then capacity eviction, then insertion as most recent
    fn insert_locked(&self, state: &mut CacheState, key: String, mut entry: CacheEntry) -> bool {
        state.remove(&key);

        if let Some(limit) = self.config.max_memory_bytes {
            if entry.size_estimate > limit {
                debug!("Not caching tree of {} bytes (limit {})", entry.size_estimate, limit);
                return false;
            }
            while state.memory_bytes + entry.size_estimate > limit && state.evict_lru() {
                state.stats.evictions_memory += 1;
            }
        }

        while state.entries.len() >= self.config.max_size && state.evict_lru() {
            state.stats.evictions_capacity += 1;
        }

        entry.tick = state.bump_tick();
        state.memory_bytes += entry.size_estimate;
        state.recency.insert(entry.tick, key.clone());
        state.entries.insert(key, entry);
        true
    }

    pub fn invalidate(&self, source: &str, filename: &str, mode: ParseMode) -> bool {
        self.state.lock().remove(&Self::key(source, filename, mode)).is_some()
    }

    /// Drops every entry and resets the counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = CacheState::default();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            max_size: self.config.max_size,
            memory_bytes: state.memory_bytes,
            ..state.stats.clone()
        }
    }

    /// The `n` most accessed entries, most accessed first
    pub fn hot_entries(&self, n: usize) -> Vec<HotEntry> {
        let state = self.state.lock();
        let mut hot: Vec<HotEntry> = state
            .entries
            .iter()
            .map(|(key, entry)| HotEntry {
                key: key.clone(),
                access_count: entry.access_count,
                size_estimate: entry.size_estimate,
            })
            .collect();
        hot.sort_by(|a, b| b.access_count.cmp(&a.access_count).then_with(|| a.key.cmp(&b.key)));
        hot.truncate(n);
        hot
    }

    /// Removes every expired entry; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        if self.config.ttl.is_none() {
            return 0;
        }
        let now = SystemTime::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(entry, self.config.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.stats.evictions_ttl += expired.len() as u64;
        if !expired.is_empty() {
            debug!("Swept {} expired AST cache entries", expired.len());
        }
        expired.len()
    }

    /// Writes all entries to the persistence file, if one is configured.
    /// Trees are snapshotted under the lock and serialized outside it.
    pub fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.config.persistence_path else {
            return Ok(());
        };
        let (entries, stats) = {
            let state = self.state.lock();
            let entries: Vec<(String, CacheEntry)> =
                state.entries.iter().map(|(k, e)| (k.clone(), e.clone())).collect();
            (entries, state.stats.clone())
        };

        let snapshot = SnapshotRef {
            version: FORMAT_VERSION,
            entries: entries
                .iter()
                .map(|(key, entry)| {
                    let timestamp = entry
                        .created_at
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs_f64())
                        .unwrap_or(0.0);
                    (
                        key.as_str(),
                        EntryRef {
                            code: &entry.module,
                            timestamp,
                            size_bytes: entry.size_estimate,
                            access_count: entry.access_count,
                        },
                    )
                })
                .collect(),
            stats: PersistedStats { hits: stats.hits, misses: stats.misses, evictions: stats.evictions() },
        };
        persistence::write_snapshot(path, &snapshot, self.config.compress)?;
        debug!("Saved {} AST cache entries to {}", entries.len(), path.display());
        Ok(())
    }

    /// Restores entries from the persistence file, dropping any that have expired
    pub fn load(&self) -> Result<usize, CacheError> {
        let Some(path) = &self.config.persistence_path else {
            return Ok(0);
        };
        let Some(persisted) = persistence::read_snapshot(path)? else {
            return Ok(0);
        };

        let now = SystemTime::now();
        let mut restored: Vec<(String, CacheEntry)> = persisted
            .entries
            .into_iter()
            .map(|(key, entry)| {
                let created_at = UNIX_EPOCH + Duration::from_secs_f64(entry.timestamp.max(0.0));
                let cache_entry = CacheEntry {
                    module: Arc::new(entry.code),
                    size_estimate: entry.size_bytes,
                    created_at,
                    access_count: entry.access_count,
                    last_access: created_at,
                    tick: 0,
                };
                (key, cache_entry)
            })
            .filter(|(_, entry)| !is_expired(entry, self.config.ttl, now))
            .collect();
        // oldest first so the newest entries end up most recently used
        restored.sort_by_key(|(_, entry)| entry.created_at);

        let mut state = self.state.lock();
        let mut count = 0;
        for (key, entry) in restored {
            if self.insert_locked(&mut state, key, entry) {
                count += 1;
            }
        }
        state.stats.hits = persisted.stats.hits;
        state.stats.misses = persisted.stats.misses;
        debug!("Restored {} AST cache entries from {}", count, path.display());
        Ok(count)
    }

    /// Starts the TTL sweep and persistence tasks on the current tokio runtime.
    /// Returns false when no runtime is available or tasks are already running.
    pub fn start_background_tasks(self: &Arc<Self>) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        if self.config.background_sweep {
            if let Some(interval) = self.config.sweep_interval() {
                let weak = Arc::downgrade(self);
                let token = cancel.clone();
                handles.push(runtime.spawn(sweep_loop(weak, token, interval)));
            }
        }

        if self.config.persistence_path.is_some() {
            let weak = Arc::downgrade(self);
            let token = cancel.clone();
            let signal = self.save_signal.clone();
            handles.push(runtime.spawn(persistence_loop(weak, token, signal)));
        }

        *tasks = Some(BackgroundTasks { cancel, handles });
        true
    }

    /// Cancels background tasks, waits for them and writes a final snapshot
    pub async fn shutdown(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    warn!("AST cache background task ended abnormally: {}", e);
                }
            }
        }
        if let Err(e) = self.save() {
            warn!("Failed to save AST cache: {}", e);
        }
    }
}

impl Drop for AstCache {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.cancel.cancel();
        }
    }
}

async fn sweep_loop(cache: Weak<AstCache>, cancel: CancellationToken, interval: Duration) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.sweep_expired();
            }
        }
    }
}

async fn persistence_loop(cache: Weak<AstCache>, cancel: CancellationToken, signal: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = signal.notified() => {
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let result = tokio::task::spawn_blocking(move || cache.save()).await;
                match result {
                    Ok(Err(e)) => warn!("Failed to save AST cache: {}", e),
                    Err(e) => warn!("AST cache save task failed: {}", e),
                    Ok(Ok(())) => {}
                }
            }
        }
    }
}
