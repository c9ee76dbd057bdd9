/*!
 * Tests for the shared AST cache
 */

use std::sync::Arc;
use std::time::Duration;

use pseudocode_translator::cache::{AstCache, AstCacheConfig};
use pseudocode_translator::python::ParseMode;

use crate::common;

#[test]
fn test_cache_hits_should_be_counted_in_hit_rate() {
    let cache = AstCache::new(AstCacheConfig::default());
    for _ in 0..4 {
        cache.parse("total = 1 + 2\n", "<test>", ParseMode::Exec).unwrap();
    }
    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
}

#[test]
fn test_cache_should_never_exceed_capacity() {
    let cache = AstCache::new(AstCacheConfig::default().with_max_size(3));
    for i in 0..10 {
        cache.parse(&format!("v{} = {}\n", i, i), "", ParseMode::Exec).unwrap();
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.stats().evictions_capacity, 7);
    assert!(cache.get("v9 = 9\n", "", ParseMode::Exec).is_some());
    assert!(cache.get("v0 = 0\n", "", ParseMode::Exec).is_none());
}

#[test]
fn test_expired_entry_should_be_reparsed() {
    let cache = AstCache::new(AstCacheConfig::default().with_ttl(Duration::from_millis(25)));
    cache.parse("x = 1\n", "", ParseMode::Exec).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    cache.parse("x = 1\n", "", ParseMode::Exec).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
}

#[test]
fn test_plain_snapshot_should_be_readable_json() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("ast_cache.json");
    let cache = AstCache::new(AstCacheConfig::default().with_persistence(&path, false));
    cache.parse("name = 'x'\n", "", ParseMode::Exec).unwrap();
    cache.save().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(value.get("version").is_some());
    assert_eq!(value["entries"].as_object().map(|e| e.len()), Some(1));
}

#[test]
fn test_compressed_snapshot_should_restore_entries_and_stats() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("ast_cache.bin");
    let config = AstCacheConfig::default().with_persistence(&path, true);
    {
        let cache = AstCache::new(config.clone());
        cache.parse("a = 1\n", "", ParseMode::Exec).unwrap();
        cache.parse("a = 1\n", "", ParseMode::Exec).unwrap();
        cache.parse("b = 2\n", "", ParseMode::Exec).unwrap();
        cache.save().unwrap();
    }
    assert!(serde_json::from_slice::<serde_json::Value>(&std::fs::read(&path).unwrap()).is_err());

    let restored = AstCache::new(config);
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.stats().hits, 1);
    assert!(restored.get("b = 2\n", "", ParseMode::Exec).is_some());
}

#[test]
fn test_corrupt_snapshot_should_start_empty() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "ast_cache.bin", "not a cache file").unwrap();
    let cache = AstCache::new(AstCacheConfig::default().with_persistence(&path, true));
    assert!(cache.is_empty());
    assert!(cache.load().is_err());
}

#[test]
fn test_shutdown_should_write_snapshot() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("cache").join("ast_cache.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let cache = Arc::new(AstCache::new(AstCacheConfig::default().with_persistence(&path, false)));

    tokio_test::block_on(async {
        assert!(cache.start_background_tasks());
        assert!(!cache.start_background_tasks());
        cache.parse("z = 3\n", "", ParseMode::Exec).unwrap();
        cache.shutdown().await;
    });
    assert!(path.exists());
}
