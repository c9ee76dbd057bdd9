/*!
 * Generation backends.
 *
 * A backend turns a natural-language instruction into Python code and
 * repairs code given validation errors. The translator only talks to the
 * [`GenerationBackend`] trait; concrete backends are looked up by name in
 * the [`BackendRegistry`]:
 * - `mock`: deterministic templates and scripted failures for tests
 * - `ollama`: a local Ollama server
 */

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

use crate::app_config::Config;
use crate::errors::BackendError;

pub mod mock;
pub mod ollama;
pub mod registry;

pub use mock::{MockBackend, MockBehavior};
pub use ollama::OllamaBackend;
pub use registry::BackendRegistry;

/// Instructions longer than this are rejected before generation
pub const MAX_INSTRUCTION_CHARS: usize = 10_000;

/// Options sent with every generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub target_language: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    /// Ask for short explanatory comments
    pub include_comments: bool,
    /// Ask for PEP 8 naming and layout
    pub follow_conventions: bool,
    pub use_type_hints: bool,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GenerationRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_language: "python".to_string(),
            temperature: config.backend.temperature,
            top_p: config.backend.top_p,
            top_k: config.backend.top_k,
            max_tokens: config.backend.max_tokens,
            include_comments: config.preserve_comments,
            follow_conventions: true,
            use_type_hints: config.use_type_hints,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Outcome of a translate or refine call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub code: String,
    pub errors: Vec<String>,
    pub tokens_used: u64,
}

impl GenerationResult {
    pub fn ok(code: impl Into<String>, tokens_used: u64) -> Self {
        Self { success: true, code: code.into(), errors: Vec::new(), tokens_used }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, code: String::new(), errors: vec![error.into()], tokens_used: 0 }
    }
}

/// Capability interface every generation backend implements
///
/// Backends are shared behind `Arc<dyn GenerationBackend>`, so any state
/// they keep uses interior mutability.
#[async_trait]
pub trait GenerationBackend: Send + Sync + Debug {
    /// Registry name of the backend
    fn name(&self) -> &str;

    /// Prepares the backend; must be called before `translate` or `refine`
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Translates one instruction, optionally biased by surrounding code
    async fn translate(
        &self,
        instruction: &str,
        request: &GenerationRequest,
        context: Option<&str>,
    ) -> Result<GenerationResult, BackendError>;

    /// Attempts to fix `code` given the validation errors it produced
    async fn refine(
        &self,
        code: &str,
        errors: &[String],
        request: &GenerationRequest,
    ) -> Result<GenerationResult, BackendError>;

    /// Rejects instructions that cannot be translated
    fn validate_input(&self, instruction: &str) -> Result<(), BackendError> {
        let trimmed = instruction.trim();
        if trimmed.is_empty() {
            return Err(BackendError::InvalidInput("instruction is empty".to_string()));
        }
        let length = trimmed.chars().count();
        if length > MAX_INSTRUCTION_CHARS {
            return Err(BackendError::InvalidInput(format!(
                "instruction is {} characters long, the limit is {}",
                length, MAX_INSTRUCTION_CHARS
            )));
        }
        Ok(())
    }

    /// Releases resources; later calls fail with `NotInitialized`
    async fn shutdown(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_config_should_copy_sampling_options() {
        let mut config = Config::default();
        config.backend.temperature = 0.7;
        config.backend.top_k = 12;
        config.use_type_hints = false;
        let request = GenerationRequest::from_config(&config);
        assert_eq!(request.target_language, "python");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.top_k, 12);
        assert!(!request.use_type_hints);
        assert_eq!(request.with_temperature(0.2).temperature, 0.2);
    }

    #[test]
    fn test_validate_input_should_reject_empty_and_oversized() {
        let backend = MockBackend::working();
        assert!(backend.validate_input("add two numbers").is_ok());
        assert!(matches!(backend.validate_input("   "), Err(BackendError::InvalidInput(_))));
        let long = "x".repeat(MAX_INSTRUCTION_CHARS + 1);
        assert!(matches!(backend.validate_input(&long), Err(BackendError::InvalidInput(_))));
    }
}
