/*!
 * Splits raw input into classified blocks.
 *
 * Every input line lands in exactly one block and the blocks' contents
 * concatenate back to the input byte for byte. Blank lines belong to the
 * block before them; leading blank lines belong to the first block.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::Arc;

use super::models::{BlockType, CodeBlock, ParseResult, ctx, meta};
use super::scoring::{Continuation, LineKind, LineScore, LineScorer};
use crate::app_config::Config;
use crate::cache::AstCache;
use crate::errors::ParsingError;
use crate::python::ast::{Stmt, StmtKind};
use crate::python::visit::{Visitor, walk_stmt};
use crate::python::{Module, ParseMode};

const TAB_WIDTH: usize = 4;

static DEFINITION_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:@|def\s|async\s+def\s|class\s)").unwrap());
static CLAUSE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:elif|else|except|finally)\b").unwrap());
static FUNCTION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+\w+").unwrap());
static CLASS_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*class\s+\w+").unwrap());
static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:import\s+\w|from\s+\S+\s+import\s)").unwrap());

struct ScoredLine<'a> {
    raw: &'a str,
    score: LineScore,
    indent: usize,
}

impl ScoredLine<'_> {
    fn text(&self) -> &str {
        self.raw.trim_end_matches(['\n', '\r'])
    }

    fn kind(&self) -> LineKind {
        self.score.kind
    }

    fn starts_definition(&self) -> bool {
        self.indent == 0 && DEFINITION_START.is_match(self.text())
    }
}

/// A block under construction: line indices `[start, end)` of its non-blank lines
struct Group {
    block_type: BlockType,
    start: usize,
    end: usize,
    definition: bool,
}

/// Segments input text into [`CodeBlock`]s
pub struct BlockParser {
    cache: Arc<AstCache>,
    scorer: LineScorer,
    max_context_length: usize,
}

impl BlockParser {
    pub fn new(cache: Arc<AstCache>, config: &Config) -> Self {
        Self {
            cache,
            scorer: LineScorer::new(&config.heuristics),
            max_context_length: config.max_context_length,
        }
    }

    pub fn scorer(&self) -> &LineScorer {
        &self.scorer
    }

    /// Segments `text`; malformed input is reported in the result, never raised
    pub fn parse(&self, text: &str) -> ParseResult {
        let mut result = ParseResult::default();
        if text.is_empty() {
            return result;
        }

        let lines = self.score_lines(text, &mut result);
        if lines.iter().all(|l| l.kind() == LineKind::Blank) {
            let mut block = CodeBlock::new(BlockType::Comment, text, (1, lines.len()));
            self.annotate(&mut block);
            result.blocks.push(block);
            return result;
        }

        let groups = group_lines(&lines);
        for (k, group) in groups.iter().enumerate() {
            let start = if k == 0 { 0 } else { group.start };
            let end = groups.get(k + 1).map(|g| g.start).unwrap_or(lines.len());
            let content: String = lines[start..end].iter().map(|l| l.raw).collect();
            let mut block = CodeBlock::new(group.block_type, content, (start + 1, end));
            self.annotate(&mut block);
            if let Some(error) = block.meta_str(meta::SYNTAX_ERROR) {
                result.warnings.push(format!(
                    "Block at lines {}-{} looks like code but does not parse: {}",
                    block.line_range.0, block.line_range.1, error
                ));
            }
            result.blocks.push(block);
        }

        self.attach_context(&mut result.blocks);
        debug!(
            "Segmented {} lines into {} blocks ({} code, {} prose, {} mixed)",
            lines.len(),
            result.blocks.len(),
            result.count(BlockType::TargetCode),
            result.count(BlockType::NaturalLanguage),
            result.count(BlockType::Mixed)
        );
        result
    }

    /// Re-segments a block line by line into code and prose sub-blocks
    pub fn split_mixed(&self, block: &CodeBlock) -> Vec<CodeBlock> {
        let mut continuation = Continuation::default();
        let mut runs: Vec<(BlockType, usize, usize)> = Vec::new();
        let mut pending_start = 0;
        let raw_lines: Vec<&str> = block.content.split_inclusive('\n').collect();

        for (i, raw) in raw_lines.iter().enumerate() {
            let score = self.scorer.classify(raw.trim_end_matches(['\n', '\r']), continuation.is_open());
            let line_type = match score.kind {
                LineKind::Code => {
                    continuation.feed(raw, i + 1);
                    BlockType::TargetCode
                }
                LineKind::Prose => BlockType::NaturalLanguage,
                LineKind::Blank | LineKind::Comment => continue,
            };
            match runs.last_mut() {
                Some(run) if run.0 == line_type => run.2 = i + 1,
                Some(run) => {
                    run.2 = i;
                    runs.push((line_type, i, i + 1));
                }
                None => {
                    runs.push((line_type, pending_start, i + 1));
                    pending_start = i + 1;
                }
            }
        }

        if runs.is_empty() {
            runs.push((BlockType::Comment, 0, raw_lines.len()));
        }
        if let Some(last) = runs.last_mut() {
            last.2 = raw_lines.len();
        }

        runs.into_iter()
            .map(|(block_type, start, end)| {
                let content: String = raw_lines[start..end].concat();
                let offset = block.line_range.0;
                let mut sub = CodeBlock::new(block_type, content, (offset + start, offset + end - 1));
                self.annotate(&mut sub);
                sub.set_meta(meta::IS_SUB_BLOCK, true);
                sub.set_meta("parent_lines", json!([block.line_range.0, block.line_range.1]));
                sub.context = block.context.clone();
                sub
            })
            .collect()
    }

    /// Fills the structural metadata of a block
    pub fn annotate(&self, block: &mut CodeBlock) {
        let text = block.text().to_string();
        let (indentation_type, max_indent_level) = indentation_profile(&text);
        block.set_meta(meta::LINE_COUNT, text.lines().count());
        block.set_meta(meta::INDENTATION_TYPE, indentation_type);
        block.set_meta(meta::MAX_INDENT_LEVEL, max_indent_level);

        let parsed = if block.block_type == BlockType::TargetCode {
            Some(self.cache.parse(&text, "<block>", ParseMode::Exec))
        } else {
            None
        };

        match parsed {
            Some(Ok(module)) => {
                let features = Features::of(&module);
                block.set_meta(meta::HAS_FUNCTIONS, features.functions);
                block.set_meta(meta::HAS_CLASSES, features.classes);
                block.set_meta(meta::HAS_IMPORTS, features.imports);
                block.set_meta(meta::HAS_DOCSTRING, features.docstring);
                block.set_meta(meta::LIKELY_COMPLETE, true);
            }
            other => {
                block.set_meta(meta::HAS_FUNCTIONS, FUNCTION_LINE.is_match(&text));
                block.set_meta(meta::HAS_CLASSES, CLASS_LINE.is_match(&text));
                block.set_meta(meta::HAS_IMPORTS, IMPORT_LINE.is_match(&text));
                block.set_meta(meta::HAS_DOCSTRING, text.contains("\"\"\"") || text.contains("'''"));
                let complete = match other {
                    Some(Err(err)) => {
                        block.set_meta(meta::SYNTAX_ERROR, err.to_string());
                        false
                    }
                    _ => !text.trim_end().ends_with([':', ',', ';', '-', '(']),
                };
                block.set_meta(meta::LIKELY_COMPLETE, complete);
            }
        }
    }

    fn score_lines<'a>(&self, text: &'a str, result: &mut ParseResult) -> Vec<ScoredLine<'a>> {
        let mut continuation = Continuation::default();
        let mut first_tab: Option<usize> = None;
        let mut first_space: Option<usize> = None;
        let mut lines = Vec::new();

        for (i, raw) in text.split_inclusive('\n').enumerate() {
            let number = i + 1;
            let body = raw.trim_end_matches(['\n', '\r']);
            let score = self.scorer.classify(body, continuation.is_open());
            if score.kind == LineKind::Code {
                continuation.feed(raw, number);
            }

            let leading: &str = &body[..body.len() - body.trim_start().len()];
            if !body.trim().is_empty() {
                if leading.contains('\t') {
                    first_tab.get_or_insert(number);
                }
                if leading.contains(' ') {
                    first_space.get_or_insert(number);
                }
            }
            let indent = leading.chars().map(|c| if c == '\t' { TAB_WIDTH } else { 1 }).sum();
            lines.push(ScoredLine { raw, score, indent });
        }

        if let (Some(tab), Some(space)) = (first_tab, first_space) {
            result.warnings.push(format!(
                "Inconsistent indentation: mixed tabs and spaces (lines {} and {})",
                tab.min(space),
                tab.max(space)
            ));
        }
        if let Some(line) = continuation.open_string_line() {
            result.errors.push(ParsingError {
                message: "unterminated triple-quoted string".to_string(),
                line,
                column: 0,
                snippet: text.lines().nth(line - 1).map(str::to_string),
            });
        } else if continuation.open_brackets() > 0 {
            result.warnings.push(format!(
                "{} bracket(s) still open at end of input",
                continuation.open_brackets()
            ));
        }
        lines
    }

    fn attach_context(&self, blocks: &mut [CodeBlock]) {
        let texts: Vec<Option<String>> =
            blocks.iter().map(|b| b.is_code().then(|| b.text().to_string())).collect();
        for (i, block) in blocks.iter_mut().enumerate() {
            block.context.insert(ctx::BLOCK_INDEX.to_string(), Value::from(i));
            if let Some(prev) = texts[..i].iter().rev().flatten().next() {
                let tail = tail_chars(prev, self.max_context_length);
                block.context.insert(ctx::PRECEDING_CODE.to_string(), Value::from(tail));
            }
            if let Some(next) = texts[i + 1..].iter().flatten().next() {
                let head = head_chars(next, self.max_context_length);
                block.context.insert(ctx::FOLLOWING_CODE.to_string(), Value::from(head));
            }
        }
    }
}

/// Groups non-blank lines into blocks, splitting code at top-level definitions
fn group_lines(lines: &[ScoredLine<'_>]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();

    for (p_start, p_end) in paragraphs(lines) {
        let para = &lines[p_start..p_end];
        let para_type = paragraph_type(para);
        let segments = if para_type == BlockType::TargetCode {
            split_code(lines, p_start, p_end)
        } else {
            vec![(p_start, p_end)]
        };

        for (n, (start, end)) in segments.into_iter().enumerate() {
            let definition = leads_with_definition(&lines[start..end]);
            if n == 0 {
                if let Some(prev) = groups.last_mut() {
                    if continues(prev, &lines[start], para_type, definition) {
                        prev.block_type = combine(prev.block_type, para_type);
                        prev.end = end;
                        continue;
                    }
                }
            }
            groups.push(Group { block_type: para_type, start, end, definition });
        }
    }
    groups
}

fn paragraphs(lines: &[ScoredLine<'_>]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        match (line.kind() == LineKind::Blank, start) {
            (true, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, lines.len()));
    }
    out
}

/// Minority lines near the threshold follow the majority instead of forcing `Mixed`
fn paragraph_type(para: &[ScoredLine<'_>]) -> BlockType {
    let code = para.iter().filter(|l| l.kind() == LineKind::Code).count();
    let prose = para.iter().filter(|l| l.kind() == LineKind::Prose).count();
    match (code, prose) {
        (0, 0) => BlockType::Comment,
        (_, 0) => BlockType::TargetCode,
        (0, _) => BlockType::NaturalLanguage,
        _ => {
            let (minority, majority) = if code >= prose {
                (LineKind::Prose, BlockType::TargetCode)
            } else {
                (LineKind::Code, BlockType::NaturalLanguage)
            };
            if para.iter().any(|l| l.kind() == minority && l.score.confident) {
                BlockType::Mixed
            } else {
                majority
            }
        }
    }
}

fn split_code(lines: &[ScoredLine<'_>], start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut cuts = vec![start];
    let mut in_definition = leads_with_definition(&lines[start..end]);
    let mut continuation = Continuation::default();

    for j in start..end {
        let line = &lines[j];
        let open = continuation.is_open();
        continuation.feed(line.raw, j + 1);
        let last_cut = cuts.last().copied().unwrap_or(start);
        if j == last_cut || open || line.indent > 0 || line.kind() == LineKind::Comment {
            continue;
        }
        let defines = line.starts_definition();
        let after_decorator = lines[j - 1].indent == 0 && lines[j - 1].text().trim_start().starts_with('@');
        let clause = CLAUSE_START.is_match(line.text());
        let has_code_before = lines[last_cut..j].iter().any(|l| l.kind() == LineKind::Code);

        if has_code_before && ((defines && !after_decorator) || (!defines && in_definition && !clause)) {
            let mut cut = j;
            while cut > last_cut + 1 && lines[cut - 1].kind() == LineKind::Comment && lines[cut - 1].indent == 0 {
                cut -= 1;
            }
            cuts.push(cut);
            in_definition = defines;
        }
    }

    let mut segments: Vec<(usize, usize)> = cuts.windows(2).map(|w| (w[0], w[1])).collect();
    if let Some(&last) = cuts.last() {
        segments.push((last, end));
    }
    segments
}

fn leads_with_definition(lines: &[ScoredLine<'_>]) -> bool {
    lines
        .iter()
        .find(|l| l.kind() != LineKind::Comment)
        .map(|l| l.starts_definition())
        .unwrap_or(false)
}

fn continues(prev: &Group, first: &ScoredLine<'_>, next_type: BlockType, definition: bool) -> bool {
    let prev_is_code = matches!(prev.block_type, BlockType::TargetCode | BlockType::Mixed);
    if prev_is_code && first.indent > 0 {
        return true;
    }
    prev.block_type == BlockType::TargetCode
        && next_type == BlockType::TargetCode
        && !prev.definition
        && !definition
}

fn combine(a: BlockType, b: BlockType) -> BlockType {
    match (a, b) {
        _ if a == b => a,
        (BlockType::Comment, other) | (other, BlockType::Comment) => other,
        _ => BlockType::Mixed,
    }
}

/// "spaces", "tabs", "mixed" or "none", plus the deepest indentation level
fn indentation_profile(text: &str) -> (&'static str, usize) {
    let mut tabs = false;
    let mut spaces = false;
    let mut widths = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let leading = &line[..line.len() - line.trim_start().len()];
        tabs |= leading.contains('\t');
        spaces |= leading.contains(' ');
        widths.push(leading.chars().map(|c| if c == '\t' { TAB_WIDTH } else { 1 }).sum::<usize>());
    }
    let kind = match (tabs, spaces) {
        (true, true) => "mixed",
        (true, false) => "tabs",
        (false, true) => "spaces",
        (false, false) => "none",
    };
    let unit = widths.iter().copied().filter(|w| *w > 0).min().unwrap_or(TAB_WIDTH);
    let level = widths.iter().map(|w| w / unit).max().unwrap_or(0);
    (kind, level)
}

#[derive(Default)]
struct Features {
    functions: bool,
    classes: bool,
    imports: bool,
    docstring: bool,
}

impl Features {
    fn of(module: &Module) -> Self {
        let mut features = Features { docstring: module.docstring().is_some(), ..Default::default() };
        for stmt in &module.body {
            features.visit_stmt(stmt);
        }
        features
    }
}

impl<'ast> Visitor<'ast> for Features {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        let body = match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                self.functions = true;
                Some(&def.body)
            }
            StmtKind::ClassDef(def) => {
                self.classes = true;
                Some(&def.body)
            }
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => {
                self.imports = true;
                None
            }
            _ => None,
        };
        if body.and_then(|b| b.first()).is_some_and(Stmt::is_docstring) {
            self.docstring = true;
        }
        walk_stmt(self, stmt);
    }
}

/// Last `n` characters of `s`
pub fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &s[idx..],
        _ if n == 0 => "",
        _ => s,
    }
}

/// First `n` characters of `s`
pub fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AstCacheConfig;

    fn parser() -> BlockParser {
        let cache = Arc::new(AstCache::new(AstCacheConfig::default()));
        BlockParser::new(cache, &Config::default())
    }

    #[test]
    fn test_parse_empty_input_should_yield_no_blocks() {
        let result = parser().parse("");
        assert!(result.blocks.is_empty());
        assert!(result.success());
    }

    #[test]
    fn test_parse_whitespace_only_should_keep_coverage() {
        let text = "  \n\n\t\n";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].block_type, BlockType::Comment);
        assert_eq!(result.reconstruct(), text);
    }

    #[test]
    fn test_parse_single_function_should_be_one_code_block() {
        let text = "def hello():\n    print('Hello, World!')";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 1);
        let block = &result.blocks[0];
        assert_eq!(block.block_type, BlockType::TargetCode);
        assert_eq!(block.content, text);
        assert_eq!(block.line_range, (1, 2));
        assert!(block.flag(meta::HAS_FUNCTIONS));
        assert!(block.flag(meta::LIKELY_COMPLETE));
        assert_eq!(block.meta_str(meta::INDENTATION_TYPE), Some("spaces"));
    }

    #[test]
    fn test_parse_english_instruction_should_be_natural_language() {
        let result = parser().parse("Create a function that calculates the average of numbers\n");
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].block_type, BlockType::NaturalLanguage);
        assert_eq!(result.blocks[0].line_range, (1, 1));
    }

    #[test]
    fn test_parse_alternating_paragraphs_should_split_and_cover_input() {
        let text = "Calculate the sum of two numbers\n\nx = 10\ny = 20\nsum = x + y\n\nDisplay the result to the user\n\nprint(sum)\n";
        let result = parser().parse(text);
        assert!(result.blocks.len() >= 3);
        assert_eq!(result.reconstruct(), text);
        assert_eq!(result.blocks[0].block_type, BlockType::NaturalLanguage);
        assert_eq!(result.blocks[1].block_type, BlockType::TargetCode);
    }

    #[test]
    fn test_parse_should_split_at_top_level_definitions() {
        let text = "def first():\n    return 1\n\ndef second():\n    return 2\nclass Third:\n    pass\n";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 3);
        assert!(result.blocks.iter().all(|b| b.is_code()));
        assert_eq!(result.blocks[1].line_range, (4, 5));
        assert_eq!(result.reconstruct(), text);
    }

    #[test]
    fn test_parse_blank_line_inside_function_should_not_split() {
        let text = "def f():\n    x = 1\n\n    return x\n";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 1);
        assert!(result.blocks[0].flag(meta::LIKELY_COMPLETE));
    }

    #[test]
    fn test_parse_decorated_function_should_stay_together() {
        let text = "x = 1\n# helper\n@staticmethod\ndef f():\n    pass\n";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 2);
        assert!(result.blocks[1].content.starts_with("# helper\n@staticmethod"));
    }

    #[test]
    fn test_parse_prose_inside_code_should_be_mixed() {
        let text = "def total(numbers):\n    Add up all of the numbers in the list\n    return result\n";
        let result = parser().parse(text);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].block_type, BlockType::Mixed);
    }

    #[test]
    fn test_parse_mixed_indentation_should_warn() {
        let text = "def f():\n    x = 1\n\tif x:\n\t    pass\n";
        let result = parser().parse(text);
        assert!(result.warnings.iter().any(|w| {
            let lower = w.to_lowercase();
            lower.contains("mixed") && lower.contains("indentation")
        }));
    }

    #[test]
    fn test_parse_windows_line_endings_should_round_trip() {
        let text = "x = 1\r\ny = 2\r\n\r\nPrint both values to the screen\r\n";
        let result = parser().parse(text);
        assert_eq!(result.reconstruct(), text);
        assert_eq!(result.blocks.len(), 2);
    }

    #[test]
    fn test_parse_unterminated_docstring_should_report_error() {
        let text = "def f():\n    \"\"\"Never closed\n    return 1\n";
        let result = parser().parse(text);
        assert!(!result.success());
        assert_eq!(result.errors[0].line, 2);
        assert_eq!(result.reconstruct(), text);
    }

    #[test]
    fn test_parse_incomplete_code_should_not_be_likely_complete() {
        let result = parser().parse("def incomplete_function():\n    # TODO: implement this\n");
        let block = &result.blocks[0];
        assert!(!block.flag(meta::LIKELY_COMPLETE));
        assert!(block.meta_str(meta::SYNTAX_ERROR).is_some());
    }

    #[test]
    fn test_parse_should_attach_neighbouring_code_as_context() {
        let text = "# Previous code\nx = 10\ny = 20\n\n# Target block\ndef add():\n    return x + y\n\n# Following code\nresult = add()\n";
        let result = parser().parse(text);
        let func = result.blocks.iter().find(|b| b.flag(meta::HAS_FUNCTIONS)).unwrap();
        assert!(func.context_str(ctx::PRECEDING_CODE).unwrap().contains("x = 10"));
        assert!(func.context_str(ctx::FOLLOWING_CODE).unwrap().contains("result = add()"));
    }

    #[test]
    fn test_split_mixed_should_coalesce_runs_and_offset_lines() {
        let p = parser();
        let text = "Some leading words here\nx = 5\ny = x * 2\nThen show the answer to the user\n";
        let mut block = CodeBlock::new(BlockType::Mixed, text, (10, 13));
        block.context.insert(ctx::BLOCK_INDEX.into(), Value::from(2));
        let subs = p.split_mixed(&block);
        let types: Vec<BlockType> = subs.iter().map(|b| b.block_type).collect();
        assert_eq!(
            types,
            vec![BlockType::NaturalLanguage, BlockType::TargetCode, BlockType::NaturalLanguage]
        );
        assert_eq!(subs[1].line_range, (11, 12));
        assert!(subs.iter().all(|b| b.is_sub_block()));
        assert_eq!(subs.iter().map(|b| b.content.as_str()).collect::<String>(), text);
    }

    #[test]
    fn test_char_helpers_should_respect_boundaries() {
        assert_eq!(tail_chars("héllo", 3), "llo");
        assert_eq!(head_chars("héllo", 2), "hé");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(tail_chars("ab", 0), "");
    }
}
