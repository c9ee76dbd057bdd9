/*!
 * Parsed-tree caching.
 *
 * Components receive an `Arc<AstCache>` explicitly. A process-wide default
 * instance exists for convenience and can be swapped at runtime.
 */

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

pub mod ast_cache;
pub mod persistence;

pub use ast_cache::{AstCache, AstCacheConfig, CacheEntry, CacheStats, HotEntry};

static DEFAULT_CACHE: Lazy<RwLock<Arc<AstCache>>> =
    Lazy::new(|| RwLock::new(Arc::new(AstCache::new(AstCacheConfig::global_default()))));

/// Handle to the current default cache
pub fn default_cache() -> Arc<AstCache> {
    DEFAULT_CACHE.read().clone()
}

/// Replaces the default cache, returning the previous instance
pub fn set_default_cache(cache: Arc<AstCache>) -> Arc<AstCache> {
    std::mem::replace(&mut *DEFAULT_CACHE.write(), cache)
}

/// Installs a fresh default cache built from the global defaults
pub fn reset_default_cache() -> Arc<AstCache> {
    set_default_cache(Arc::new(AstCache::new(AstCacheConfig::global_default())))
}
