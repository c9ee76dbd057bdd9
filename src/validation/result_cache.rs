/*!
 * Bounded cache of validation results.
 *
 * Keys combine the kind of check with a SHA-256 of the code. When full, the
 * oldest inserted entry is dropped.
 */

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

use super::ValidationResult;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, ValidationResult>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

pub struct ResultCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(Inner::default()) }
    }

    pub fn key(kind: &str, code: &str) -> String {
        let digest = Sha256::digest(code.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}:{}", kind, hex)
    }

    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).cloned() {
            Some(result) => {
                inner.hits += 1;
                Some(result)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: String, result: ValidationResult) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), result).is_some() {
            return;
        }
        inner.order.push_back(key);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> ResultCacheStats {
        let inner = self.inner.lock();
        ResultCacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_beyond_capacity_should_drop_oldest() {
        let cache = ResultCache::new(2);
        cache.put(ResultCache::key("syntax", "a"), ValidationResult::new());
        cache.put(ResultCache::key("syntax", "b"), ValidationResult::new());
        cache.put(ResultCache::key("syntax", "c"), ValidationResult::new());
        assert!(cache.get(&ResultCache::key("syntax", "a")).is_none());
        assert!(cache.get(&ResultCache::key("syntax", "c")).is_some());
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn test_key_should_separate_check_kinds() {
        assert_ne!(ResultCache::key("syntax", "x = 1"), ResultCache::key("logic", "x = 1"));
        assert!(ResultCache::key("logic", "x").starts_with("logic:"));
    }
}
