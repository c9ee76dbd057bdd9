use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigurationError;

/// Application configuration module
/// This module handles loading, validating and saving the translator settings.
/// Every field has a serde default so partial JSON files are accepted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Spaces per indentation level in generated code
    #[serde(default = "default_indent_size")]
    pub indent_size: usize,

    /// Lines longer than this are reported as warnings
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    #[serde(default = "default_true")]
    pub preserve_comments: bool,

    #[serde(default = "default_true")]
    pub preserve_docstrings: bool,

    #[serde(default = "default_true")]
    pub use_type_hints: bool,

    /// Add imports for well-known modules the code uses but never imports
    #[serde(default = "default_true")]
    pub auto_import_common: bool,

    /// Upper bound on characters of surrounding code sent as context
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    #[serde(default = "default_true")]
    pub validate_imports: bool,

    #[serde(default = "default_true")]
    pub check_undefined_vars: bool,

    #[serde(default)]
    pub allow_unsafe_operations: bool,

    #[serde(default)]
    pub validation_level: ValidationLevel,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    /// Documents translated concurrently in batch mode
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// How strictly generated code is judged
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    #[default]
    Strict,
    Normal,
    Lenient,
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Lenient => "lenient",
        };
        write!(f, "{}", name)
    }
}

/// Named presets for common environments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigProfile {
    Development,
    Production,
    Testing,
}

impl std::str::FromStr for ConfigProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "testing" | "test" => Ok(Self::Testing),
            _ => Err(anyhow::anyhow!("Invalid configuration profile: {}", s)),
        }
    }
}

/// Generation backend settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    /// Registry name of the backend (e.g. "ollama", "mock")
    #[serde(default = "default_backend_name")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Upper bound for a single backend call
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: default_backend_name(),
            model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            timeout_seconds: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// AST cache limits and persistence
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Entries older than this are treated as misses; `None` disables expiry
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: Option<u64>,

    /// Total estimated tree memory ceiling; `None` disables the limit
    #[serde(default = "default_cache_memory")]
    pub max_memory_mb: Option<u64>,

    /// File the cache is saved to and restored from
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub compress: bool,

    #[serde(default = "default_true")]
    pub enable_background_sweep: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_seconds: default_cache_ttl(),
            max_memory_mb: default_cache_memory(),
            persistence_path: None,
            compress: true,
            enable_background_sweep: true,
        }
    }
}

/// Tunable constants of the classification and assembly heuristics
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeuristicsConfig {
    /// Lines scoring at or above this are code
    #[serde(default = "default_code_threshold")]
    pub code_threshold: f64,

    /// Lines within this distance of the threshold count as ambiguous
    #[serde(default = "default_mixed_delta")]
    pub mixed_delta: f64,

    /// Number of preceding code blocks joined into a block's context
    #[serde(default = "default_context_code_blocks")]
    pub context_code_blocks: usize,

    /// How far back to look for those code blocks
    #[serde(default = "default_context_window_blocks")]
    pub context_window_blocks: usize,

    #[serde(default = "default_context_lookahead_chars")]
    pub context_lookahead_chars: usize,

    /// Errors passed to the backend during repair
    #[serde(default = "default_repair_error_count")]
    pub repair_error_count: usize,

    #[serde(default = "default_repair_temperature")]
    pub repair_temperature: f32,

    /// Regexes marking statements that should run under a main guard
    #[serde(default = "default_executable_patterns")]
    pub executable_patterns: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            code_threshold: default_code_threshold(),
            mixed_delta: default_mixed_delta(),
            context_code_blocks: default_context_code_blocks(),
            context_window_blocks: default_context_window_blocks(),
            context_lookahead_chars: default_context_lookahead_chars(),
            repair_error_count: default_repair_error_count(),
            repair_temperature: default_repair_temperature(),
            executable_patterns: default_executable_patterns(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_indent_size() -> usize {
    4
}

fn default_max_line_length() -> usize {
    88
}

fn default_max_context_length() -> usize {
    2048
}

fn default_true() -> bool {
    true
}

fn default_batch_workers() -> usize {
    4
}

fn default_backend_name() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_cache_max_size() -> usize {
    500
}

fn default_cache_ttl() -> Option<u64> {
    Some(3600)
}

fn default_cache_memory() -> Option<u64> {
    Some(200)
}

fn default_code_threshold() -> f64 {
    0.5
}

fn default_mixed_delta() -> f64 {
    0.3
}

fn default_context_code_blocks() -> usize {
    2
}

fn default_context_window_blocks() -> usize {
    3
}

fn default_context_lookahead_chars() -> usize {
    200
}

fn default_repair_error_count() -> usize {
    3
}

fn default_repair_temperature() -> f32 {
    0.2
}

fn default_executable_patterns() -> Vec<String> {
    vec![
        r"\bprint\s*\(".to_string(),
        r"\binput\s*\(".to_string(),
        r"\b(main|run|execute)\s*\(".to_string(),
    ]
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Preset tuned for an environment
    pub fn for_profile(profile: ConfigProfile) -> Self {
        let mut config = Config::default();
        match profile {
            ConfigProfile::Development => {
                config.validation_level = ValidationLevel::Normal;
                config.log_level = LogLevel::Debug;
                config.backend.temperature = 0.5;
            }
            ConfigProfile::Production => {
                config.validation_level = ValidationLevel::Strict;
                config.log_level = LogLevel::Warn;
                config.cache.max_size = 1000;
            }
            ConfigProfile::Testing => {
                config.validation_level = ValidationLevel::Strict;
                config.backend.name = "mock".to_string();
                config.backend.timeout_seconds = 5;
                config.cache.ttl_seconds = None;
                config.cache.enable_background_sweep = false;
            }
        }
        config
    }

    /// Validate the configuration for consistency and required values.
    /// The first offending key is reported.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if ![2, 4, 8].contains(&self.indent_size) {
            return Err(ConfigurationError::new(
                "indent_size",
                format!("should be 2, 4, or 8, got {}", self.indent_size),
            ));
        }
        if !(50..=120).contains(&self.max_line_length) {
            return Err(ConfigurationError::new(
                "max_line_length",
                format!("should be between 50 and 120, got {}", self.max_line_length),
            ));
        }
        if self.max_context_length == 0 {
            return Err(ConfigurationError::new("max_context_length", "must be positive"));
        }
        if self.batch_workers == 0 {
            return Err(ConfigurationError::new("batch_workers", "must be at least 1"));
        }

        let backend = &self.backend;
        if backend.name.trim().is_empty() {
            return Err(ConfigurationError::new("backend.name", "cannot be empty"));
        }
        if !(0.0..=2.0).contains(&backend.temperature) {
            return Err(ConfigurationError::new(
                "backend.temperature",
                format!("must be between 0.0 and 2.0, got {}", backend.temperature),
            ));
        }
        if !(1..=32768).contains(&backend.max_tokens) {
            return Err(ConfigurationError::new(
                "backend.max_tokens",
                format!("must be between 1 and 32768, got {}", backend.max_tokens),
            ));
        }
        if !(0.0..=1.0).contains(&backend.top_p) {
            return Err(ConfigurationError::new("backend.top_p", "must be between 0.0 and 1.0"));
        }
        if backend.timeout_seconds == 0 {
            return Err(ConfigurationError::new("backend.timeout_seconds", "must be positive"));
        }
        if url::Url::parse(&backend.endpoint).is_err() {
            return Err(ConfigurationError::new(
                "backend.endpoint",
                format!("'{}' is not a valid URL", backend.endpoint),
            ));
        }

        if self.cache.max_size == 0 {
            return Err(ConfigurationError::new("cache.max_size", "must be at least 1"));
        }
        if self.cache.ttl_seconds == Some(0) {
            return Err(ConfigurationError::new("cache.ttl_seconds", "use null to disable expiry"));
        }

        let heuristics = &self.heuristics;
        if !(0.0..=1.0).contains(&heuristics.code_threshold) {
            return Err(ConfigurationError::new(
                "heuristics.code_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        for pattern in &heuristics.executable_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(ConfigurationError::new(
                    "heuristics.executable_patterns",
                    format!("invalid regex '{}'", pattern),
                ));
            }
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            indent_size: default_indent_size(),
            max_line_length: default_max_line_length(),
            preserve_comments: true,
            preserve_docstrings: true,
            use_type_hints: true,
            auto_import_common: true,
            max_context_length: default_max_context_length(),
            validate_imports: true,
            check_undefined_vars: true,
            allow_unsafe_operations: false,
            validation_level: ValidationLevel::default(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            heuristics: HeuristicsConfig::default(),
            batch_workers: default_batch_workers(),
            log_level: LogLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_should_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_with_bad_indent_should_name_key() {
        let mut config = Config::default();
        config.indent_size = 3;
        let err = config.validate().unwrap_err();
        assert_eq!(err.key, "indent_size");
    }

    #[test]
    fn test_validate_with_bad_endpoint_should_name_key() {
        let mut config = Config::default();
        config.backend.endpoint = "not a url".to_string();
        assert_eq!(config.validate().unwrap_err().key, "backend.endpoint");
    }

    #[test]
    fn test_partial_json_should_fill_defaults() {
        let config: Config = serde_json::from_str(r#"{"indent_size": 2, "backend": {"name": "mock"}}"#).unwrap();
        assert_eq!(config.indent_size, 2);
        assert_eq!(config.backend.name, "mock");
        assert_eq!(config.backend.max_tokens, 1024);
        assert_eq!(config.heuristics.code_threshold, 0.5);
        assert_eq!(config.cache.max_size, 500);
    }

    #[test]
    fn test_testing_profile_should_use_mock_backend() {
        let config = Config::for_profile(ConfigProfile::Testing);
        assert_eq!(config.backend.name, "mock");
        assert!(config.validate().is_ok());
    }
}
