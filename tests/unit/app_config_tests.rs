/*!
 * Tests for application configuration functionality
 */

use pseudocode_translator::app_config::{Config, ConfigProfile, LogLevel, ValidationLevel};

use crate::common;

#[test]
fn test_default_config_with_no_file_should_have_documented_defaults() {
    let config = Config::default();

    assert_eq!(config.indent_size, 4);
    assert_eq!(config.max_line_length, 88);
    assert_eq!(config.max_context_length, 2048);
    assert_eq!(config.validation_level, ValidationLevel::Strict);
    assert!(config.auto_import_common);
    assert!(!config.allow_unsafe_operations);
    assert_eq!(config.batch_workers, 4);
    assert_eq!(config.log_level, LogLevel::Info);

    assert_eq!(config.backend.name, "ollama");
    assert_eq!(config.backend.endpoint, "http://localhost:11434");
    assert_eq!(config.backend.timeout_seconds, 30);
    assert_eq!(config.backend.retry_count, 3);

    assert_eq!(config.cache.max_size, 500);
    assert_eq!(config.cache.ttl_seconds, Some(3600));
    assert!(config.cache.persistence_path.is_none());

    assert_eq!(config.heuristics.context_code_blocks, 2);
    assert_eq!(config.heuristics.context_lookahead_chars, 200);
    assert_eq!(config.heuristics.repair_error_count, 3);
}

#[test]
fn test_validate_with_out_of_range_values_should_name_first_key() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.max_line_length = 200;
    assert_eq!(config.validate().unwrap_err().key, "max_line_length");
    config.max_line_length = 88;

    config.backend.temperature = 3.5;
    assert_eq!(config.validate().unwrap_err().key, "backend.temperature");
    config.backend.temperature = 0.3;

    config.cache.ttl_seconds = Some(0);
    assert_eq!(config.validate().unwrap_err().key, "cache.ttl_seconds");
    config.cache.ttl_seconds = None;

    config.heuristics.executable_patterns.push("(unclosed".to_string());
    assert_eq!(config.validate().unwrap_err().key, "heuristics.executable_patterns");
}

#[test]
fn test_profiles_should_parse_and_adjust_settings() {
    let profile: ConfigProfile = "prod".parse().unwrap();
    assert_eq!(profile, ConfigProfile::Production);
    assert!("staging".parse::<ConfigProfile>().is_err());

    let development = Config::for_profile(ConfigProfile::Development);
    assert_eq!(development.validation_level, ValidationLevel::Normal);
    assert_eq!(development.log_level, LogLevel::Debug);

    let testing = Config::for_profile(ConfigProfile::Testing);
    assert_eq!(testing.backend.name, "mock");
    assert!(!testing.cache.enable_background_sweep);
    assert!(testing.validate().is_ok());
}

#[test]
fn test_saved_config_should_load_back_with_same_values() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.indent_size = 2;
    config.backend.model = "codellama:7b".to_string();
    config.save(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.indent_size, 2);
    assert_eq!(loaded.backend.model, "codellama:7b");
    assert_eq!(loaded.backend.name, config.backend.name);
}

#[test]
fn test_from_file_with_malformed_json_should_fail_with_path() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "broken.json", "{ \"indent_size\": ").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("broken.json"));
}
