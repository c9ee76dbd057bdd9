/*!
 * End-to-end tests of the translation pipeline over the mock backend
 */

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use pseudocode_translator::backends::{BackendRegistry, MockBackend};
use pseudocode_translator::translation::{Stage, TranslationManager};

use crate::common;

#[tokio::test]
async fn test_translate_add_instruction_should_produce_function() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let result = manager
        .translate_text("create a function called add that returns the sum of a and b")
        .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.code.as_deref(), Some("def add(a, b):\n    return a + b\n"));
    assert_eq!(result.metadata.stage, Stage::Done);
    assert_eq!(result.metadata.blocks_translated, 1);
    assert!(result.metadata.validation_passed);
    assert_eq!(backend.translate_calls(), 1);
}

#[tokio::test]
async fn test_translate_mixed_document_should_merge_code_and_translations() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let result = manager.translate_text(common::MIXED_DOCUMENT).await;

    assert!(result.success, "{:?}", result.errors);
    let code = result.code.unwrap();
    assert!(code.starts_with("import os\n"), "{}", code);
    assert_eq!(code.matches("import os").count(), 1);
    assert!(code.contains("count = 10"));
    assert!(code.contains("def add(a, b):\n    return a + b"));
    assert!(code.contains("def greet(name):"));
    assert_eq!(result.metadata.blocks_total, 4);
    assert_eq!(result.metadata.blocks_translated, 2);
    assert_eq!(backend.translate_calls(), 2);
}

#[tokio::test]
async fn test_code_only_input_should_not_call_backend() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let result = manager.translate_text("def square(x):\n    return x * x\n").await;
    assert!(result.success);
    assert_eq!(result.code.as_deref(), Some("def square(x):\n    return x * x\n"));
    assert_eq!(backend.translate_calls(), 0);
}

#[tokio::test]
async fn test_multi_line_program_should_translate_without_repair() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let program = concat!(
        "def main():\n",
        "    # gather the values\n",
        "    values = [1, 2, 3]\n",
        "\n",
        "    return helper(values)\n",
        "\n",
        "\n",
        "def helper(values):\n",
        "    return sum(values)\n",
        "\n",
        "\n",
        "main()\n",
    );
    let result = manager.translate_text(program).await;

    assert!(result.success, "{:?}", result.errors);
    assert!(result.metadata.validation_passed);
    assert!(!result.metadata.repaired);
    assert_eq!(backend.translate_calls(), 0);
    assert_eq!(backend.refine_calls(), 0);
    let code = result.code.unwrap();
    assert!(code.contains("return helper(values)"), "{}", code);
    assert!(code.contains("def helper(values):"), "{}", code);
}

#[tokio::test]
async fn test_undefined_name_should_trigger_single_repair() {
    let backend = MockBackend::fixed("print(y)").with_refinement("y = 1\nprint(y)");
    let (manager, backend) = common::manager_with(backend);
    let result = manager.translate_text("display the value of y on the screen").await;

    assert!(result.success, "{:?}", result.errors);
    assert!(result.metadata.repaired);
    assert_eq!(backend.refine_calls(), 1);
    assert_eq!(result.code.as_deref(), Some("y = 1\nprint(y)\n"));
}

#[tokio::test]
async fn test_unrepairable_code_should_fail_validation_and_keep_code() {
    let (manager, backend) = common::manager_with(MockBackend::fixed("print(y)"));
    let result = manager.translate_text("display the value of y on the screen").await;

    assert!(!result.success);
    assert_eq!(backend.refine_calls(), 1);
    assert_eq!(result.metadata.failed_stage, Some(Stage::Validation));
    assert!(result.errors.iter().any(|e| e.contains("Undefined name 'y'")));
    assert!(result.code.is_some());
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn test_unterminated_docstring_should_fail_during_parsing() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let result = manager.translate_text("def f():\n    \"\"\"Never closed\n    return 1\n").await;

    assert!(!result.success);
    assert!(result.code.is_none());
    assert_eq!(result.metadata.stage, Stage::Failed);
    assert_eq!(result.metadata.failed_stage, Some(Stage::Parsing));
    assert!(!result.errors.is_empty());
    assert_eq!(backend.translate_calls(), 0);
}

#[tokio::test]
async fn test_intermittent_backend_should_fail_only_affected_block() {
    let text = "set a to 1\n\nx = 2\n\nset b to 3\n";
    let (manager, _) = common::manager_with(MockBackend::intermittent(2));
    let result = manager.translate_text(text).await;

    assert_eq!(result.metadata.blocks_translated, 1);
    assert_eq!(result.metadata.blocks_failed, 1);
    assert!(result.warnings.iter().any(|w| w.starts_with("Failed to translate block at lines 5-5")));
    let code = result.code.unwrap_or_default();
    assert!(code.contains("a = 1"));
    assert!(!code.contains("b = 3"));
}

#[tokio::test]
async fn test_cancelled_token_should_skip_all_translations() {
    let (manager, backend) = common::manager_with(MockBackend::working());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = manager
        .translate_with_cancellation("x = 1\n\nprint the value of x to the screen please\n", cancel)
        .await;

    assert!(result.metadata.cancelled);
    assert_eq!(result.metadata.blocks_failed, 1);
    assert_eq!(backend.translate_calls(), 0);
    assert!(result.warnings.iter().any(|w| w.contains("Translation cancelled")));
}

#[tokio::test]
async fn test_cancel_during_slow_call_should_return_promptly() {
    let (manager, _) = common::manager_with(MockBackend::slow(5_000));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        manager.translate_with_cancellation("set total to 5\n", cancel),
    )
    .await
    .expect("cancellation should interrupt the backend call");
    assert!(result.metadata.cancelled);
    assert!(!result.success);
}

#[tokio::test]
async fn test_translate_file_should_read_input() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "task.pseudo", "set limit to 3\n").unwrap();
    let (manager, _) = common::manager_with(MockBackend::working());

    let result = manager.translate_file(&path).await.unwrap();
    assert_eq!(result.code.as_deref(), Some("# Global variables\nlimit = 3\n"));
    assert!(manager.translate_file(dir.path().join("missing.txt")).await.is_err());
}

#[tokio::test]
async fn test_concurrent_calls_should_get_unique_ids() {
    let (manager, _) = common::manager_with(MockBackend::working());
    let manager = Arc::new(manager);
    let calls = (0..8).map(|i| {
        let manager = manager.clone();
        async move { manager.translate_text(&format!("set item{} to {}", i, i)).await }
    });
    let results = join_all(calls).await;

    let mut ids: Vec<u64> = results.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert!(results.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_manager_from_config_should_use_registry_backend() {
    common::init_logger();
    let manager = TranslationManager::from_config(common::test_config(), &BackendRegistry::with_builtins()).unwrap();
    manager.initialize().await.unwrap();
    assert_eq!(manager.backend().name(), "mock");

    let result = manager.translate_text("set ready to 1\n").await;
    assert_eq!(result.metadata.backend, "mock");
    assert!(result.success);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_unknown_backend_name_should_fail_construction() {
    let mut config = common::test_config();
    config.backend.name = "missing".to_string();
    assert!(TranslationManager::from_config(config, &BackendRegistry::with_builtins()).is_err());
}
