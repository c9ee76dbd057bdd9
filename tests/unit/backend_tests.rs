/*!
 * Tests for the backend registry and the mock backend
 */

use std::sync::Arc;

use pseudocode_translator::app_config::BackendConfig;
use pseudocode_translator::backends::ollama::extract_code;
use pseudocode_translator::backends::{
    BackendRegistry, GenerationBackend, GenerationRequest, MAX_INSTRUCTION_CHARS, MockBackend,
};
use pseudocode_translator::errors::BackendError;

fn named(name: &str) -> BackendConfig {
    BackendConfig { name: name.to_string(), ..BackendConfig::default() }
}

#[test]
fn test_registry_should_resolve_names_case_insensitively() {
    let registry = BackendRegistry::with_builtins();
    assert!(registry.contains("MOCK"));
    assert_eq!(registry.create(&named("Ollama")).unwrap().name(), "ollama");
    assert!(matches!(registry.create(&named("nope")), Err(BackendError::UnknownBackend(_))));
}

#[test]
fn test_registered_backend_should_replace_builtin() {
    let mut registry = BackendRegistry::with_builtins();
    registry.register("mock", |_| Ok(Arc::new(MockBackend::fixed("answer = 42")) as Arc<dyn GenerationBackend>));
    let backend = registry.create(&named("mock")).unwrap();

    tokio_test::block_on(async {
        backend.initialize().await.unwrap();
        let result = backend.translate("anything at all", &GenerationRequest::default(), None).await.unwrap();
        assert_eq!(result.code, "answer = 42");
    });
}

#[test]
fn test_mock_before_initialize_should_fail() {
    let backend = MockBackend::working();
    let result = tokio_test::block_on(backend.translate("set x to 1", &GenerationRequest::default(), None));
    assert!(matches!(result, Err(BackendError::NotInitialized(_))));
}

#[test]
fn test_mock_templates_should_cover_common_instructions() {
    assert_eq!(MockBackend::template_for("set total to 0"), "total = 0");
    assert_eq!(
        MockBackend::template_for("create a function called mul that returns the product of x and y"),
        "def mul(x, y):\n    return x * y"
    );
    assert_eq!(MockBackend::template_for("print hello"), "print(\"hello\")");
    assert!(MockBackend::template_for("do something unusual").starts_with("# do something unusual"));
}

#[test]
fn test_intermittent_mock_should_fail_every_nth_call() {
    let backend = MockBackend::intermittent(2);
    let request = GenerationRequest::default();
    tokio_test::block_on(async {
        backend.initialize().await.unwrap();
        assert!(backend.translate("set a to 1", &request, None).await.is_ok());
        let second = backend.translate("set b to 2", &request, None).await;
        assert!(matches!(second, Err(BackendError::ApiError { status_code: 503, .. })));
        assert!(backend.translate("set c to 3", &request, None).await.is_ok());
    });
    assert_eq!(backend.translate_calls(), 3);
}

#[test]
fn test_oversized_instruction_should_be_rejected() {
    let backend = MockBackend::working();
    let instruction = "word ".repeat(MAX_INSTRUCTION_CHARS);
    assert!(matches!(backend.validate_input(&instruction), Err(BackendError::InvalidInput(_))));
    assert!(matches!(backend.validate_input("   "), Err(BackendError::InvalidInput(_))));
    assert!(backend.validate_input("set x to 1").is_ok());
}

#[test]
fn test_refine_should_return_configured_fix_and_count_calls() {
    let backend = MockBackend::fixed("print(y)").with_refinement("y = 0\nprint(y)");
    tokio_test::block_on(async {
        backend.initialize().await.unwrap();
        let errors = vec!["Undefined name 'y'".to_string()];
        let result = backend.refine("print(y)", &errors, &GenerationRequest::default()).await.unwrap();
        assert_eq!(result.code, "y = 0\nprint(y)");
    });
    assert_eq!(backend.refine_calls(), 1);
}

#[test]
fn test_extract_code_should_join_fenced_blocks() {
    let answer = "First:\n```python\nimport os\n```\nThen:\n```python\nprint(os.sep)\n```\n";
    assert_eq!(extract_code(answer), "import os\n\nprint(os.sep)");
}
