/*!
 * Validation of generated Python code.
 *
 * Checks run on a single assembled text:
 * - Syntax: parse errors, indentation, undefined names, imports, unsafe calls
 * - Logic: unreachable code, endless loops, missing returns, suspicious literals
 * - Suggestions: non-blocking style, performance and hygiene advice
 *
 * # Architecture
 *
 * - `scope`: lexical scope analysis for undefined names
 * - `syntax`: the syntax pass and its error suggestions
 * - `logic`: heuristic logic warnings
 * - `suggestions`: improvement hints
 * - `result_cache`: bounded cache of validation results
 * - `service`: the [`Validator`] tying the passes together
 */

use serde::Serialize;

pub mod logic;
pub mod result_cache;
pub mod scope;
pub mod service;
pub mod suggestions;
pub mod syntax;

pub use service::Validator;

/// Outcome of a validation call
///
/// Errors make the code invalid; warnings never do. `line_numbers` holds the
/// lines of those errors that point at a specific line, in error order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub line_numbers: Vec<usize>,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>, line: Option<usize>) {
        self.errors.push(message.into());
        if let Some(line) = line {
            self.line_numbers.push(line);
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
    }

    /// Appends everything from `other`, skipping duplicate messages
    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            if !self.errors.contains(&error) {
                self.errors.push(error);
            }
        }
        for line in other.line_numbers {
            if !self.line_numbers.contains(&line) {
                self.line_numbers.push(line);
            }
        }
        for warning in other.warnings {
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
        for suggestion in other.suggestions {
            self.add_suggestion(suggestion);
        }
    }

    /// First `n` error messages, used as repair context
    pub fn top_errors(&self, n: usize) -> Vec<String> {
        self.errors.iter().take(n).cloned().collect()
    }
}
