/*!
 * Line-level heuristics deciding whether a line is Python or prose.
 *
 * The code score combines keyword shape, a trial parse and punctuation
 * signals; the prose score looks for sentence-like structure. Both are
 * clamped to `[0, 1]`.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::app_config::HeuristicsConfig;
use crate::python::parse_module;

const STATEMENT_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "for", "while", "try", "except", "finally", "with",
    "return", "import", "from", "raise", "pass", "break", "continue", "yield", "assert", "del",
    "global", "nonlocal", "async", "await", "lambda",
];

const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "to", "of", "and", "that", "with", "for", "from", "in", "is", "are", "each",
    "then", "it", "this", "all", "by", "which", "should", "will", "every", "its", "their", "into",
    "using", "until", "otherwise", "given", "when",
];

const IMPERATIVE_VERBS: &[&str] = &[
    "Create", "Define", "Write", "Make", "Calculate", "Compute", "Return", "Print", "Display",
    "Show", "Read", "Load", "Save", "Store", "Initialize", "Set", "Get", "Add", "Remove",
    "Delete", "Check", "Loop", "Iterate", "Implement", "Build", "Generate", "Find", "Sort",
    "Filter", "Convert", "Parse", "Validate", "Call", "Use", "Open", "Close", "Update",
    "Increment", "Decrement", "Declare", "Ask", "Prompt", "Output", "Handle", "Count", "Sum",
    "Multiply", "Divide", "Append", "Insert", "Split", "Join", "Merge", "Repeat", "Keep",
    "Raise", "Import", "Then", "Otherwise", "If", "For", "While", "Finally", "Start", "Stop",
];

static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][\w\.\[\]'\x22, :]*\s*(?:[+\-*/%&|^@]|//|\*\*|<<|>>)?=[^=]").unwrap());
static CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][\w\.]*\(").unwrap());

/// Classification of one physical line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    Code,
    Prose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineScore {
    pub kind: LineKind,
    pub code_score: f64,
    /// False when the score sits within `mixed_delta` of the threshold
    pub confident: bool,
}

impl LineScore {
    fn fixed(kind: LineKind) -> Self {
        Self { kind, code_score: if kind == LineKind::Code { 1.0 } else { 0.0 }, confident: true }
    }
}

/// Scores lines against the configured threshold
#[derive(Debug, Clone)]
pub struct LineScorer {
    threshold: f64,
    delta: f64,
}

impl Default for LineScorer {
    fn default() -> Self {
        Self::new(&HeuristicsConfig::default())
    }
}

impl LineScorer {
    pub fn new(heuristics: &HeuristicsConfig) -> Self {
        Self { threshold: heuristics.code_threshold, delta: heuristics.mixed_delta }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classifies a line; `continuation` marks lines inside an open bracket or string
    pub fn classify(&self, line: &str, continuation: bool) -> LineScore {
        if continuation {
            return LineScore::fixed(LineKind::Code);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineScore::fixed(LineKind::Blank);
        }
        if trimmed.starts_with('#') {
            return LineScore::fixed(LineKind::Comment);
        }
        if trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''") {
            return LineScore::fixed(LineKind::Code);
        }
        let score = self.code_score(trimmed);
        let kind = if score > self.threshold { LineKind::Code } else { LineKind::Prose };
        LineScore { kind, code_score: score, confident: (score - self.threshold).abs() >= self.delta }
    }

    /// Likelihood that `line` is Python
    pub fn code_score(&self, line: &str) -> f64 {
        let line = line.trim();
        if line.is_empty() {
            return 0.0;
        }
        let mut score: f64 = 0.0;
        let parses = trial_parse(line);

        if parses && starts_with_keyword(line) {
            score += 0.5;
        }
        if line.starts_with('@') && parses {
            score += 0.5;
        }
        if parses {
            score += 0.35;
        }
        if ASSIGNMENT.is_match(line) {
            score += 0.3;
        }
        if CALL.is_match(line) {
            score += 0.25;
        }
        if ends_open(line) {
            score += 0.3;
        }
        score += punctuation_density(line).min(0.15);

        if self.prose_score(line) > 0.6 {
            score -= 0.3;
        }
        score.clamp(0.0, 1.0)
    }

    /// Likelihood that `line` is a natural-language sentence
    pub fn prose_score(&self, line: &str) -> f64 {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }
        let mut score: f64 = 0.0;

        let alphabetic = words.iter().filter(|w| is_plain_word(w)).count();
        if words.len() >= 3 && alphabetic as f64 / words.len() as f64 >= 0.8 {
            score += 0.4;
        }

        let function_words = words
            .iter()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| FUNCTION_WORDS.contains(&w.as_str()))
            .count();
        score += match function_words {
            0 => 0.0,
            1 => 0.2,
            _ => 0.3,
        };

        if IMPERATIVE_VERBS.contains(&words[0].trim_end_matches([',', ':'])) {
            score += 0.3;
        }
        if line.ends_with(['.', '?', '!']) && !line.ends_with("...") {
            score += 0.1;
        }

        let code_chars = line.chars().filter(|c| "()[]{}=;_".contains(*c)).count();
        score -= (code_chars as f64 * 0.1).min(0.4);
        score.clamp(0.0, 1.0)
    }
}

fn is_plain_word(word: &str) -> bool {
    let word = word.trim_end_matches(['.', ',', ';', ':', '!', '?']);
    !word.is_empty() && word.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
}

fn starts_with_keyword(line: &str) -> bool {
    let first = line.split(|c: char| !c.is_alphanumeric() && c != '_').next().unwrap_or("");
    STATEMENT_KEYWORDS.contains(&first)
}

fn ends_open(line: &str) -> bool {
    let code = strip_comment(line).trim_end();
    code.ends_with(['(', '[', '{', ',', '\\'])
}

fn punctuation_density(line: &str) -> f64 {
    let visible = line.chars().filter(|c| !c.is_whitespace()).count();
    if visible == 0 {
        return 0.0;
    }
    let punct = line.chars().filter(|c| "()[]{}=:.,+-*/%<>".contains(*c)).count();
    punct as f64 / visible as f64 * 0.5
}

/// Parses a single line, completing block headers and dangling clauses first
fn trial_parse(line: &str) -> bool {
    let code = strip_comment(line).trim_end();
    if code.is_empty() {
        return false;
    }
    if code.starts_with('@') {
        return parse_module(&format!("{code}\ndef _f():\n    pass\n")).is_ok();
    }
    let first = code.split(|c: char| !c.is_alphanumeric() && c != '_').next().unwrap_or("");
    let prefix = match first {
        "elif" | "else" => "if True:\n    pass\n",
        "except" | "finally" => "try:\n    pass\n",
        _ => "",
    };
    let suffix = if code.ends_with(':') { "\n    pass\n" } else { "\n" };
    parse_module(&format!("{prefix}{code}{suffix}")).is_ok()
}

/// Drops a trailing `#` comment that is not inside a string
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Tracks open brackets, triple-quoted strings and backslash joins across lines
#[derive(Debug, Default, Clone)]
pub struct Continuation {
    depth: usize,
    triple: Option<&'static str>,
    triple_line: usize,
    backslash: bool,
}

impl Continuation {
    pub fn is_open(&self) -> bool {
        self.depth > 0 || self.triple.is_some() || self.backslash
    }

    /// Line where the still-open triple-quoted string began
    pub fn open_string_line(&self) -> Option<usize> {
        self.triple.map(|_| self.triple_line)
    }

    pub fn open_brackets(&self) -> usize {
        self.depth
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn feed(&mut self, line: &str, line_number: usize) {
        let text = line.trim_end_matches(['\n', '\r']);
        let bytes = text.as_bytes();
        let mut i = 0;
        self.backslash = false;

        while i < bytes.len() {
            if let Some(delim) = self.triple {
                match text[i..].find(delim) {
                    Some(pos) => {
                        i += pos + 3;
                        self.triple = None;
                    }
                    None => return,
                }
                continue;
            }
            match bytes[i] {
                b'#' => break,
                b'"' | b'\'' => {
                    let rest = &text[i..];
                    if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
                        self.triple = Some(if bytes[i] == b'"' { "\"\"\"" } else { "'''" });
                        self.triple_line = line_number;
                        i += 3;
                        continue;
                    }
                    let quote = bytes[i];
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                b'(' | b'[' | b'{' => self.depth += 1,
                b')' | b']' | b'}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
        }
        self.backslash = self.triple.is_none() && strip_comment(text).trim_end().ends_with('\\');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_score_for_function_definition_should_exceed_threshold() {
        let scorer = LineScorer::default();
        assert!(scorer.code_score("def calculate(x, y): return x + y") > 0.5);
        assert!(scorer.code_score("x = 10") > 0.5);
        assert!(scorer.code_score("print(x)") > 0.5);
        assert!(scorer.code_score("else:") > 0.5);
        assert!(scorer.code_score("import math") > 0.5);
    }

    #[test]
    fn test_code_score_for_instruction_should_stay_below_threshold() {
        let scorer = LineScorer::default();
        assert!(scorer.code_score("Create a function to calculate the sum") < 0.5);
        assert!(scorer.code_score("For each item in the list, print it") < 0.5);
    }

    #[test]
    fn test_prose_score_should_separate_sentences_from_code() {
        let scorer = LineScorer::default();
        assert!(scorer.prose_score("Create a function that calculates the average of numbers") > 0.5);
        assert!(scorer.prose_score("result = sum(numbers) / len(numbers)") < 0.5);
    }

    #[test]
    fn test_classify_with_continuation_should_force_code() {
        let scorer = LineScorer::default();
        let score = scorer.classify("the rest of a docstring", true);
        assert_eq!(score.kind, LineKind::Code);
        assert_eq!(scorer.classify("   ", false).kind, LineKind::Blank);
        assert_eq!(scorer.classify("# note", false).kind, LineKind::Comment);
    }

    #[test]
    fn test_continuation_should_track_brackets_and_triple_strings() {
        let mut cont = Continuation::default();
        cont.feed("numbers = [\n", 1);
        assert!(cont.is_open());
        cont.feed("    1, 2, 3]\n", 2);
        assert!(!cont.is_open());

        cont.feed("\"\"\"Docstring start\n", 3);
        assert_eq!(cont.open_string_line(), Some(3));
        cont.feed("still inside (\n", 4);
        cont.feed("end\"\"\"\n", 5);
        assert!(!cont.is_open());

        cont.feed("x = 'it''s (' # comment (\n", 6);
        assert!(!cont.is_open());
    }

    #[test]
    fn test_strip_comment_should_ignore_hash_inside_strings() {
        assert_eq!(strip_comment("x = '#' # note"), "x = '#' ");
        assert_eq!(strip_comment("y = 1"), "y = 1");
    }
}
