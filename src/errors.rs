/*!
 * Error types for the pseudocode translator.
 *
 * Each stage of the pipeline has its own error enum, built with thiserror.
 * [`TranslatorError`] wraps all of them and can always produce at least one
 * actionable suggestion for the user.
 */

use std::fmt;
use thiserror::Error;

use crate::python::SyntaxError;

/// Malformed input detected while segmenting or parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct ParsingError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub snippet: Option<String>,
}

impl From<SyntaxError> for ParsingError {
    fn from(err: SyntaxError) -> Self {
        Self { message: err.message, line: err.line, column: err.column, snippet: err.snippet }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Syntax,
    Logic,
    Security,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Logic => "logic",
            Self::Security => "security",
        };
        f.write_str(name)
    }
}

/// Generated code failed validation
#[derive(Error, Debug, Clone)]
#[error("{kind} error: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub line: Option<usize>,
}

/// A code assembly stage failed
#[derive(Error, Debug, Clone)]
#[error("assembly failed during {stage}: {message}")]
pub struct AssemblyError {
    pub stage: String,
    pub message: String,
}

impl AssemblyError {
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        Self { stage: stage.to_string(), message: message.into() }
    }
}

/// A configuration value is missing or out of range
#[derive(Error, Debug, Clone)]
#[error("invalid configuration for '{key}': {message}")]
pub struct ConfigurationError {
    pub key: String,
    pub message: String,
}

impl ConfigurationError {
    pub fn new(key: &str, message: impl Into<String>) -> Self {
        Self { key: key.to_string(), message: message.into() }
    }
}

/// Errors raised by the AST cache; callers only ever see them in logs
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported cache file version {0}")]
    UnsupportedVersion(u32),

    #[error("Cache compression error: {0}")]
    Compression(String),
}

/// Errors that can occur when talking to a generation backend
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The backend was used before `initialize` or after `shutdown`
    #[error("Backend '{0}' is not initialized")]
    NotInitialized(String),

    /// No constructor registered under this name
    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    /// Instruction rejected before generation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Stage-level error of the translator; wraps every other error type
#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("Parsing error: {0}")]
    Parsing(#[from] ParsingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Any other error, with an optional underlying cause
    #[error("Translator error: {message}")]
    Other {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TranslatorError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other { message: message.into(), cause: None }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other { message: message.into(), cause: Some(Box::new(cause)) }
    }

    /// Actionable hints for the user; never empty
    pub fn suggestions(&self) -> Vec<String> {
        let mut suggestions = match self {
            Self::Parsing(err) => vec![
                format!("Check the input around line {}", err.line),
                "Separate instructions and code with blank lines".to_string(),
            ],
            Self::Validation(err) => match err.kind {
                ValidationErrorKind::Syntax => vec![
                    "Fix the reported syntax error and validate again".to_string(),
                    "Check for missing colons, brackets or quotes".to_string(),
                ],
                ValidationErrorKind::Logic => {
                    vec!["Review the control flow around the reported line".to_string()]
                }
                ValidationErrorKind::Security => vec![
                    "Replace unsafe calls with safer alternatives".to_string(),
                    "Set allow_unsafe_operations only if the code is trusted".to_string(),
                ],
            },
            Self::Assembly(err) => vec![format!(
                "Inspect the translated blocks; the '{}' stage could not merge them",
                err.stage
            )],
            Self::Configuration(err) => {
                vec![format!("Correct the '{}' setting in the configuration file", err.key)]
            }
            Self::Cache(_) => vec!["Clear the AST cache or delete its persistence file".to_string()],
            Self::Backend(err) => match err {
                BackendError::ConnectionError(_) | BackendError::RequestFailed(_) => vec![
                    "Make sure the generation backend is running and reachable".to_string(),
                ],
                BackendError::Timeout(_) => {
                    vec!["Increase backend.timeout_seconds or simplify the instruction".to_string()]
                }
                BackendError::UnknownBackend(_) => {
                    vec!["Use one of the registered backends, e.g. 'ollama' or 'mock'".to_string()]
                }
                _ => vec!["Check the backend configuration and try again".to_string()],
            },
            Self::Other { .. } => Vec::new(),
        };
        if suggestions.is_empty() {
            suggestions.push("Run again with --log-level debug for details".to_string());
        }
        suggestions
    }
}

impl From<anyhow::Error> for TranslatorError {
    fn from(error: anyhow::Error) -> Self {
        Self::other(error.to_string())
    }
}

impl From<std::io::Error> for TranslatorError {
    fn from(error: std::io::Error) -> Self {
        Self::with_cause("I/O failure", error)
    }
}

impl From<SyntaxError> for TranslatorError {
    fn from(error: SyntaxError) -> Self {
        Self::Parsing(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translator_error_suggestions_should_never_be_empty() {
        let errors = vec![
            TranslatorError::other("boom"),
            TranslatorError::from(AssemblyError::new("imports", "bad")),
            TranslatorError::from(ConfigurationError::new("indent_size", "must be 2, 4 or 8")),
            TranslatorError::from(BackendError::Timeout(30)),
            TranslatorError::from(ValidationError {
                kind: ValidationErrorKind::Security,
                message: "eval".into(),
                line: Some(1),
            }),
        ];
        for error in errors {
            assert!(!error.suggestions().is_empty(), "no suggestion for {}", error);
        }
    }

    #[test]
    fn test_assembly_error_display_should_name_stage() {
        let err = AssemblyError::new("consistency", "unbalanced indentation");
        assert_eq!(err.to_string(), "assembly failed during consistency: unbalanced indentation");
    }

    #[test]
    fn test_with_cause_should_expose_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = TranslatorError::with_cause("save failed", io);
        assert!(err.source().is_some());
    }
}
