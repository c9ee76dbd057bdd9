/*!
 * Tests for batch translation over a shared manager
 */

use std::sync::Arc;

use pseudocode_translator::backends::MockBackend;
use pseudocode_translator::translation::BatchTranslator;

use crate::common;

fn translator(backend: MockBackend, workers: usize) -> BatchTranslator {
    let (manager, _) = common::manager_with(backend);
    BatchTranslator::new(Arc::new(manager), workers)
}

#[test]
fn test_zero_workers_should_be_clamped_to_one() {
    assert_eq!(translator(MockBackend::working(), 0).workers(), 1);
}

#[tokio::test]
async fn test_directory_batch_should_mirror_layout() {
    let input = common::create_temp_dir().unwrap();
    let output = common::create_temp_dir().unwrap();
    common::create_test_file(input.path(), "first.txt", "set first to 1\n").unwrap();
    common::create_test_file(input.path(), "nested/second.pseudo", "set second to 2\n").unwrap();
    common::create_test_file(input.path(), "notes.py", "ignored = True\n").unwrap();

    let report = translator(MockBackend::working(), 2)
        .translate_directory(input.path(), output.path())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.succeeded(), 2);
    let second = std::fs::read_to_string(output.path().join("nested/second.py")).unwrap();
    assert_eq!(second, "# Global variables\nsecond = 2\n");
    assert!(!output.path().join("notes.py").exists());
    assert!(report.outcomes.iter().all(|o| o.output.is_some()));
}

#[tokio::test]
async fn test_failed_documents_should_be_reported_not_written() {
    let input = common::create_temp_dir().unwrap();
    let output = common::create_temp_dir().unwrap();
    common::create_test_file(input.path(), "good.txt", "x = 1\n").unwrap();
    common::create_test_file(input.path(), "bad.txt", "def f():\n    \"\"\"open\n").unwrap();

    let report = translator(MockBackend::working(), 4)
        .translate_directory(input.path(), output.path())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert!(output.path().join("good.py").exists());
    assert!(!output.path().join("bad.py").exists());
    assert!(report.summary().starts_with("2 document(s): 1 succeeded, 1 failed"));
}

#[tokio::test]
async fn test_missing_files_should_yield_error_outcomes() {
    let dir = common::create_temp_dir().unwrap();
    let present = common::create_test_file(dir.path(), "here.txt", "set here to 1\n").unwrap();
    let paths = vec![dir.path().join("gone.txt"), present];

    let report = translator(MockBackend::working(), 2).translate_files(&paths).await;
    assert_eq!(report.outcomes[0].index, 0);
    assert!(report.outcomes[0].result.is_err());
    assert!(report.outcomes[1].succeeded());
}

#[test]
fn test_texts_batch_should_run_under_block_on() {
    let batch = translator(MockBackend::working(), 3);
    let documents: Vec<String> = vec!["set a to 1".into(), "print hello".into(), "x = 2".into()];
    let results = tokio_test::block_on(batch.translate_texts(&documents));

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].code.as_deref(), Some("# Global variables\na = 1\n"));
    assert_eq!(results[2].code.as_deref(), Some("# Global variables\nx = 2\n"));
}
