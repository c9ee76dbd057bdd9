/*!
 * Outcome of one translation call.
 */

use serde::Serialize;
use std::fmt;

/// Pipeline stage of a translation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    BlockProcessing,
    DependencyResolution,
    Assembly,
    Validation,
    Repair,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsing => "parsing",
            Self::BlockProcessing => "block processing",
            Self::DependencyResolution => "dependency resolution",
            Self::Assembly => "assembly",
            Self::Validation => "validation",
            Self::Repair => "repair",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters and flags gathered while translating
#[derive(Debug, Clone, Serialize)]
pub struct TranslationMetadata {
    /// Last stage reached; `Done` or `Failed` once the call returns
    pub stage: Stage,
    /// Stage that stopped an unsuccessful call
    pub failed_stage: Option<Stage>,
    pub backend: String,
    pub duration_ms: u64,
    pub blocks_total: usize,
    pub blocks_translated: usize,
    pub blocks_failed: usize,
    pub tokens_used: u64,
    /// AST cache hits recorded while this call ran
    pub cache_hits: u64,
    pub validation_passed: bool,
    /// The backend's refined code replaced the original
    pub repaired: bool,
    pub cancelled: bool,
}

impl TranslationMetadata {
    pub fn new(backend: &str) -> Self {
        Self {
            stage: Stage::Parsing,
            failed_stage: None,
            backend: backend.to_string(),
            duration_ms: 0,
            blocks_total: 0,
            blocks_translated: 0,
            blocks_failed: 0,
            tokens_used: 0,
            cache_hits: 0,
            validation_passed: false,
            repaired: false,
            cancelled: false,
        }
    }
}

/// Always returned by the manager, even when a stage fails
#[derive(Debug, Clone, Serialize)]
pub struct TranslationResult {
    /// Unique id of the call within its manager
    pub id: u64,
    pub success: bool,
    pub code: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub metadata: TranslationMetadata,
}

impl TranslationResult {
    pub fn new(id: u64, backend: &str) -> Self {
        Self {
            id,
            success: false,
            code: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            metadata: TranslationMetadata::new(backend),
        }
    }

    pub fn add_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
    }

    /// One-line human readable outcome
    pub fn summary(&self) -> String {
        let meta = &self.metadata;
        if self.success {
            let mut summary = format!(
                "Translation #{} succeeded in {} ms: {} block(s), {} translated, {} failed",
                self.id, meta.duration_ms, meta.blocks_total, meta.blocks_translated, meta.blocks_failed
            );
            if meta.repaired {
                summary.push_str(", repaired");
            }
            if !self.warnings.is_empty() {
                summary.push_str(&format!(", {} warning(s)", self.warnings.len()));
            }
            summary
        } else {
            let reason = self.errors.first().map(String::as_str).unwrap_or("unknown error");
            let stage = meta.failed_stage.unwrap_or(meta.stage);
            format!("Translation #{} failed during {}: {}", self.id, stage, reason)
        }
    }
}
