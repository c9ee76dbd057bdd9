/*!
 * Common test utilities for the pseudocode-translator test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;

use pseudocode_translator::app_config::{Config, ConfigProfile};
use pseudocode_translator::backends::MockBackend;
use pseudocode_translator::cache::{AstCache, AstCacheConfig};
use pseudocode_translator::translation::TranslationManager;

static LOGGER: Once = Once::new();

/// Routes library logs to the test output; safe to call from every test
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Testing profile: mock backend, no TTL, no background sweep
pub fn test_config() -> Config {
    Config::for_profile(ConfigProfile::Testing)
}

/// A private cache so tests never share entries or counters
pub fn fresh_cache() -> Arc<AstCache> {
    Arc::new(AstCache::new(AstCacheConfig::default()))
}

/// Manager over `backend`; the backend is returned for call inspection
pub fn manager_with(backend: MockBackend) -> (TranslationManager, Arc<MockBackend>) {
    manager_with_config(test_config(), backend)
}

pub fn manager_with_config(config: Config, backend: MockBackend) -> (TranslationManager, Arc<MockBackend>) {
    init_logger();
    let backend = Arc::new(backend);
    let manager = TranslationManager::new(config, backend.clone(), fresh_cache());
    (manager, backend)
}

/// A document mixing prose instructions and Python
pub const MIXED_DOCUMENT: &str = concat!(
    "import os\n",
    "\n",
    "create a function called add that returns the sum of a and b\n",
    "\n",
    "def greet(name):\n",
    "    return 'Hello ' + name\n",
    "\n",
    "set count to 10\n",
);
