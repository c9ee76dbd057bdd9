use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ParsingError;

/// Well-known metadata keys
pub mod meta {
    pub const TRANSLATED: &str = "translated";
    pub const TRANSLATION_FAILED: &str = "translation_failed";
    pub const ERROR: &str = "error";
    pub const DEFINED_NAMES: &str = "defined_names";
    pub const REQUIRED_IMPORTS: &str = "required_imports";
    pub const IS_SUB_BLOCK: &str = "is_sub_block";
    pub const ORIGINAL_TYPE: &str = "original_type";
    pub const HAS_FUNCTIONS: &str = "has_functions";
    pub const HAS_CLASSES: &str = "has_classes";
    pub const HAS_IMPORTS: &str = "has_imports";
    pub const HAS_DOCSTRING: &str = "has_docstring";
    pub const LINE_COUNT: &str = "line_count";
    pub const MAX_INDENT_LEVEL: &str = "max_indent_level";
    pub const INDENTATION_TYPE: &str = "indentation_type";
    pub const LIKELY_COMPLETE: &str = "likely_complete";
    pub const SYNTAX_ERROR: &str = "syntax_error";
}

/// Well-known context keys
pub mod ctx {
    pub const PRECEDING_CODE: &str = "preceding_code";
    pub const FOLLOWING_CODE: &str = "following_code";
    pub const BLOCK_INDEX: &str = "block_index";
}

/// Classification of a span of input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    NaturalLanguage,
    TargetCode,
    Mixed,
    Comment,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NaturalLanguage => "natural_language",
            Self::TargetCode => "target_code",
            Self::Mixed => "mixed",
            Self::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// A contiguous span of input with one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub block_type: BlockType,
    /// Exact input text, line terminators included
    pub content: String,
    /// First and last line, 1-based and inclusive
    pub line_range: (usize, usize),
    pub metadata: BTreeMap<String, Value>,
    pub context: BTreeMap<String, Value>,
}

impl CodeBlock {
    pub fn new(block_type: BlockType, content: impl Into<String>, line_range: (usize, usize)) -> Self {
        Self {
            block_type,
            content: content.into(),
            line_range,
            metadata: BTreeMap::new(),
            context: BTreeMap::new(),
        }
    }

    /// Content without trailing blank lines or whitespace
    pub fn text(&self) -> &str {
        self.content.trim_end()
    }

    pub fn is_code(&self) -> bool {
        self.block_type == BlockType::TargetCode
    }

    pub fn needs_translation(&self) -> bool {
        matches!(self.block_type, BlockType::NaturalLanguage | BlockType::Mixed)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// String list stored under `key`, empty when absent
    pub fn meta_list(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    pub fn is_sub_block(&self) -> bool {
        self.flag(meta::IS_SUB_BLOCK)
    }
}

/// Ordered blocks of one input plus parse-level diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub blocks: Vec<CodeBlock>,
    #[serde(skip)]
    pub errors: Vec<ParsingError>,
    pub warnings: Vec<String>,
}

impl ParseResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Concatenation of every block's content, in order
    pub fn reconstruct(&self) -> String {
        self.blocks.iter().map(|b| b.content.as_str()).collect()
    }

    pub fn count(&self, block_type: BlockType) -> usize {
        self.blocks.iter().filter(|b| b.block_type == block_type).count()
    }
}
