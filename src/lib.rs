/*!
 * # Pseudocode Translator
 *
 * A Rust library that turns documents mixing English instructions and
 * Python into a single validated Python program.
 *
 * ## Features
 *
 * - Segment input into code, prose, mixed and comment blocks
 * - Translate prose blocks through a pluggable generation backend:
 *   - Ollama (local LLM)
 *   - A deterministic mock for tests
 * - Merge blocks into one program with deduplicated, grouped imports
 * - Validate syntax, undefined names, unsafe calls and control flow
 * - One automatic repair attempt when validation fails
 * - Parse cache with TTL, memory limits and compressed persistence
 * - Batch processing of whole directories
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `errors`: Error types for every stage
 * - `python`: Lexer, parser and AST for the generated Python
 * - `cache`: Shared AST cache
 * - `blocks`: Block segmentation of the input
 * - `assembler`: Merging code blocks into one program
 * - `validation`: Syntax and logic checks
 * - `backends`: Generation backends and their registry
 * - `translation`: The translation pipeline and batch processing
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod assembler;
pub mod backends;
pub mod blocks;
pub mod cache;
pub mod errors;
pub mod python;
pub mod translation;
pub mod validation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use assembler::{AssembledCode, CodeAssembler};
pub use backends::{BackendRegistry, GenerationBackend, GenerationRequest, GenerationResult, MockBackend};
pub use blocks::{BlockParser, BlockType, CodeBlock, ParseResult};
pub use cache::{AstCache, AstCacheConfig};
pub use errors::{AssemblyError, BackendError, ConfigurationError, ParsingError, TranslatorError, ValidationError};
pub use translation::{BatchTranslator, TranslationManager, TranslationResult};
pub use validation::{ValidationResult, Validator};
