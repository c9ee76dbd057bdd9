/*!
 * Main test entry point for the pseudocode-translator test suite
 */

// Import common test utilities
pub mod common;

// Import unit tests
mod unit {
    // Configuration loading and validation
    pub mod app_config_tests;

    // Error display and suggestions
    pub mod errors_tests;

    // Block segmentation
    pub mod block_parser_tests;

    // Program assembly
    pub mod assembler_tests;

    // Syntax, scope and logic validation
    pub mod validator_tests;

    // AST cache limits and persistence
    pub mod cache_tests;

    // Generation backends and registry
    pub mod backend_tests;
}

// Import integration tests
mod integration {
    // End-to-end translation of documents
    pub mod translation_pipeline_tests;

    // Directory and multi-document processing
    pub mod batch_tests;
}
