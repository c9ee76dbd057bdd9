/*!
 * Tests for error types and conversions
 */

use std::error::Error;

use pseudocode_translator::errors::{
    AssemblyError, BackendError, CacheError, ConfigurationError, ParsingError, TranslatorError,
    ValidationError, ValidationErrorKind,
};
use pseudocode_translator::python::parse_module;

#[test]
fn test_backend_error_api_error_should_display_status_and_message() {
    let error = BackendError::ApiError { status_code: 503, message: "model is loading".to_string() };
    let display = error.to_string();
    assert!(display.contains("503"));
    assert!(display.contains("model is loading"));
}

#[test]
fn test_backend_error_timeout_should_display_seconds() {
    assert_eq!(BackendError::Timeout(30).to_string(), "Request timed out after 30 seconds");
}

#[test]
fn test_parsing_error_should_display_position() {
    let error = ParsingError { message: "unexpected indent".to_string(), line: 3, column: 4, snippet: None };
    assert_eq!(error.to_string(), "unexpected indent (line 3, column 4)");
}

#[test]
fn test_syntax_error_should_convert_to_parsing_error() {
    let syntax = parse_module("def f(:\n    pass\n").unwrap_err();
    let line = syntax.line;
    let error = TranslatorError::from(syntax);
    match &error {
        TranslatorError::Parsing(parsing) => assert_eq!(parsing.line, line),
        other => panic!("expected a parsing error, got {:?}", other),
    }
    assert!(error.suggestions().iter().any(|s| s.contains(&format!("line {}", line))));
}

#[test]
fn test_every_error_kind_should_offer_a_suggestion() {
    let errors = vec![
        TranslatorError::from(ValidationError {
            kind: ValidationErrorKind::Security,
            message: "eval() call".to_string(),
            line: Some(2),
        }),
        TranslatorError::from(AssemblyError::new("consistency", "unterminated string")),
        TranslatorError::from(ConfigurationError::new("backend.endpoint", "not a URL")),
        TranslatorError::from(CacheError::UnsupportedVersion(9)),
        TranslatorError::from(BackendError::UnknownBackend("gpt".to_string())),
        TranslatorError::from(BackendError::NotInitialized("mock".to_string())),
        TranslatorError::from(anyhow::anyhow!("something odd")),
        TranslatorError::other("plain"),
    ];
    for error in errors {
        assert!(!error.suggestions().is_empty(), "no suggestion for {}", error);
    }
}

#[test]
fn test_configuration_suggestion_should_name_key() {
    let error = TranslatorError::from(ConfigurationError::new("indent_size", "must be 2, 4 or 8"));
    assert!(error.suggestions()[0].contains("indent_size"));
}

#[test]
fn test_io_error_should_keep_cause() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pseudo");
    let error = TranslatorError::from(io);
    let source = error.source().expect("cause should be kept");
    assert!(source.to_string().contains("missing.pseudo"));
}
