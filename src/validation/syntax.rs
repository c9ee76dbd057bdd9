/*!
 * Syntax pass of the validator.
 *
 * The caller parses the code; this module turns parse failures into
 * messages with fix suggestions and runs the checks that need a valid tree
 * or the raw lines: indentation, undefined names, imports, unsafe calls and
 * structural smells.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::ValidationResult;
use super::scope;
use crate::app_config::{Config, ValidationLevel};
use crate::blocks::scoring::{Continuation, strip_comment};
use crate::python::ast::{Module, Stmt, StmtKind};
use crate::python::SyntaxError;

const MAX_SYNTAX_SUGGESTIONS: usize = 3;

/// Modules whose import is reported when unsafe operations are not allowed
const SENSITIVE_MODULES: &[&str] = &["os", "sys", "subprocess", "shutil"];

struct UnsafePattern {
    regex: Regex,
    label: &'static str,
    remedy: &'static str,
}

fn unsafe_pattern(pattern: &str, label: &'static str, remedy: &'static str) -> UnsafePattern {
    UnsafePattern { regex: Regex::new(pattern).unwrap(), label, remedy }
}

static UNSAFE_PATTERNS: Lazy<Vec<UnsafePattern>> = Lazy::new(|| {
    vec![
        unsafe_pattern(
            r"\beval\s*\(",
            "eval()",
            "Use ast.literal_eval() for safe evaluation of literals",
        ),
        unsafe_pattern(
            r"\bexec\s*\(",
            "exec()",
            "Avoid dynamic code execution; call the needed functions directly",
        ),
        unsafe_pattern(
            r"\b__import__\s*\(",
            "__import__()",
            "Use importlib.import_module() with a fixed module name",
        ),
        unsafe_pattern(
            r"(^|[^.\w])compile\s*\(",
            "compile()",
            "Avoid dynamic code execution; call the needed functions directly",
        ),
        unsafe_pattern(
            r#"\bopen\s*\([^)]*['"][wa]b?\+?['"]"#,
            "open() for writing",
            "Validate file paths before writing",
        ),
        unsafe_pattern(
            r"\bos\.(system|popen|exec\w*)\s*\(",
            "os process call",
            "Use subprocess with argument lists and validated input",
        ),
        unsafe_pattern(
            r"\bsubprocess\.(run|call|Popen|check_call|check_output)\s*\(",
            "subprocess call",
            "Use subprocess with argument lists and validated input",
        ),
        unsafe_pattern(
            r"\bshutil\.rmtree\s*\(",
            "shutil.rmtree()",
            "Confirm the target path before deleting directories",
        ),
        unsafe_pattern(
            r"\bos\.(remove|unlink|rmdir)\s*\(",
            "file deletion",
            "Confirm the target path before deleting files",
        ),
    ]
});

struct Smell {
    regex: Regex,
    message: &'static str,
    strict_only: bool,
}

static SMELLS: Lazy<Vec<Smell>> = Lazy::new(|| {
    let smell = |pattern: &str, message: &'static str, strict_only: bool| Smell {
        regex: Regex::new(pattern).unwrap(),
        message,
        strict_only,
    };
    vec![
        smell(r"^\s*except\s*:", "Bare except clause - specify exception types", false),
        smell(r"\bimport\s+\*", "Wildcard import - import names explicitly", false),
        smell(r"^\s*global\s+", "Use of global statement - pass values explicitly", false),
        smell(r"\b(TODO|FIXME|XXX)\b", "Unfinished work marker left in code", false),
        smell(r#"^\s*print\s*\(\s*f?["'](?i:debug)"#, "Debug print statement left in code", true),
    ]
});

static KEYWORD_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(if|elif|else|for|while|def|class|try|except|finally|with|async\s+def|match|case)\b")
        .unwrap()
});

/// Message for a parse failure, including the offending line when known
pub fn syntax_error_message(err: &SyntaxError) -> String {
    let mut message = format!("Syntax error: {} (line {}, column {})", err.message, err.line, err.column + 1);
    if let Some(snippet) = err.snippet.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        message.push_str(&format!(": {}", snippet));
    }
    message
}

/// Up to three fix suggestions chosen from the shape of the error message
pub fn fix_suggestions(err: &SyntaxError) -> Vec<String> {
    let message = err.message.to_lowercase();
    let snippet = err.snippet.as_deref().unwrap_or("").trim();
    let mut suggestions: Vec<&str> = Vec::new();

    if message.starts_with("expected ':'") {
        suggestions.push("Add a colon (:) at the end of the statement header");
    } else if message.contains("invalid syntax") {
        let code = strip_comment(snippet).trim_end();
        if KEYWORD_HEADER.is_match(code) && !code.ends_with(':') {
            suggestions.push("Add a colon (:) at the end of the statement header");
        }
        if bracket_balance(code) != 0 {
            suggestions.push("Check for mismatched parentheses or brackets");
        }
        if code.matches('"').count() % 2 == 1 || code.matches('\'').count() % 2 == 1 {
            suggestions.push("Check for an unclosed string literal");
        }
        if suggestions.is_empty() {
            suggestions.push("Check for missing colons, parentheses, or quotes");
        }
    } else if message.contains("unexpected indent") {
        suggestions.push("Remove the extra indentation at the start of the line");
        suggestions.push("Make sure the line belongs to the enclosing block");
    } else if message.contains("expected an indented block") {
        suggestions.push("Add indented code after the colon (:)");
        suggestions.push("Use 'pass' if the block should be empty");
    } else if message.contains("unindent does not match") {
        suggestions.push("Align the line with the indentation of an enclosing block");
        suggestions.push("Use the same number of spaces for every line in a block");
    } else if message.contains("was never closed") {
        suggestions.push("Add the missing closing bracket");
        suggestions.push("Check that every opening bracket has a matching closing bracket");
    } else if message.contains("unmatched") {
        suggestions.push("Remove the unmatched closing bracket");
        suggestions.push("Check that every opening bracket has a matching closing bracket");
    } else if message.contains("unterminated") {
        suggestions.push("Close the string literal with a matching quote");
        suggestions.push("Use triple quotes for strings spanning multiple lines");
    } else if message.contains("eof") {
        suggestions.push("The code ends unexpectedly; check for unclosed brackets or blocks");
    }

    if suggestions.is_empty() {
        suggestions.push("Check for missing colons, parentheses, or quotes");
    }
    suggestions.truncate(MAX_SYNTAX_SUGGESTIONS);
    suggestions.into_iter().map(String::from).collect()
}

fn bracket_balance(code: &str) -> i64 {
    code.chars().fold(0, |depth, c| match c {
        '(' | '[' | '{' => depth + 1,
        ')' | ']' | '}' => depth - 1,
        _ => depth,
    })
}

/// Records a parse failure on `result`
pub fn report_parse_failure(err: &SyntaxError, result: &mut ValidationResult) {
    result.add_error(syntax_error_message(err), Some(err.line));
    for suggestion in fix_suggestions(err) {
        result.add_suggestion(suggestion);
    }
}

/// Checks for code that parsed successfully
pub struct SyntaxChecks<'a> {
    config: &'a Config,
}

impl<'a> SyntaxChecks<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn run(&self, code: &str, module: &Module, result: &mut ValidationResult) {
        self.check_indentation(code, result);

        if self.config.check_undefined_vars {
            let report = scope::analyze(module);
            debug!("Scope analysis found {} issue(s)", report.issues.len());
            for issue in report.issues {
                let line = issue.line();
                result.add_error(format!("Line {}: {}", line, issue), Some(line));
            }
        }

        if self.config.validate_imports {
            self.check_imports(module, result);
        }

        if !self.config.allow_unsafe_operations {
            self.check_unsafe_operations(code, result);
        }

        if self.config.validation_level != ValidationLevel::Lenient {
            self.check_smells(code, result);
        }
    }

    /// Mixed tabs and spaces, and lines whose indentation matches no open block
    pub fn check_indentation(&self, code: &str, result: &mut ValidationResult) {
        let mut continuation = Continuation::default();
        let mut stack: Vec<usize> = vec![0];
        let mut expect_indent = false;
        let mut seen_tabs: Option<usize> = None;
        let mut seen_spaces: Option<usize> = None;

        for (index, line) in code.lines().enumerate() {
            let line_number = index + 1;
            let continued = continuation.is_open();
            continuation.feed(line, line_number);
            let code_part = strip_comment(line).trim_end();
            if continued || code_part.trim().is_empty() {
                continue;
            }

            let leading: &str = &line[..line.len() - line.trim_start().len()];
            if leading.contains('\t') {
                seen_tabs.get_or_insert(line_number);
            }
            if leading.contains(' ') {
                seen_spaces.get_or_insert(line_number);
            }
            if leading.contains('\t') && leading.contains(' ') {
                result.add_error(
                    format!("Line {}: Mixed tabs and spaces in indentation", line_number),
                    Some(line_number),
                );
                return;
            }

            let width: usize = leading.chars().map(|c| if c == '\t' { self.config.indent_size } else { 1 }).sum();
            let top = stack.last().copied().unwrap_or(0);
            if expect_indent && width > top {
                stack.push(width);
            } else if width > top {
                result.add_error(
                    format!("Line {}: Unexpected indentation level", line_number),
                    Some(line_number),
                );
                return;
            } else if width < top {
                while stack.last().is_some_and(|&level| level > width) {
                    stack.pop();
                }
                if stack.last().copied() != Some(width) {
                    result.add_error(
                        format!("Line {}: Inconsistent indentation", line_number),
                        Some(line_number),
                    );
                    return;
                }
            }
            expect_indent = code_part.ends_with(':');
        }

        if let (Some(tab_line), Some(space_line)) = (seen_tabs, seen_spaces) {
            let line = tab_line.max(space_line);
            result.add_error(
                format!(
                    "Line {}: Mixed tabs and spaces in indentation (lines {} and {})",
                    line,
                    tab_line.min(space_line),
                    line
                ),
                Some(line),
            );
        }
    }

    fn check_imports(&self, module: &Module, result: &mut ValidationResult) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut imports = Vec::new();
        collect_imports(&module.body, &mut imports);

        for stmt in imports {
            let line = stmt.span.line;
            let entries: Vec<(String, String)> = match &stmt.kind {
                StmtKind::Import(names) => names
                    .iter()
                    .map(|alias| (alias.name.clone(), format!("import {}", render_alias(alias))))
                    .collect(),
                StmtKind::ImportFrom { module: from, names, level } => {
                    let base = format!("{}{}", ".".repeat(*level), from.as_deref().unwrap_or(""));
                    names
                        .iter()
                        .filter(|alias| alias.name != "*")
                        .map(|alias| (base.clone(), format!("from {} import {}", base, render_alias(alias))))
                        .collect()
                }
                _ => Vec::new(),
            };

            for (module_name, rendered) in entries {
                if let Some(first) = seen.get(&rendered) {
                    result.add_warning(format!(
                        "Line {}: Duplicate import '{}' (first imported on line {})",
                        line, rendered, first
                    ));
                } else {
                    seen.insert(rendered, line);
                }
                let root = module_name.split('.').next().unwrap_or(&module_name);
                if !self.config.allow_unsafe_operations && SENSITIVE_MODULES.contains(&root) {
                    result.add_warning(format!("Line {}: Potentially unsafe import '{}'", line, root));
                }
            }
        }
    }

    fn check_unsafe_operations(&self, code: &str, result: &mut ValidationResult) {
        for (index, line) in code.lines().enumerate() {
            let text = strip_comment(line);
            for pattern in UNSAFE_PATTERNS.iter() {
                if pattern.regex.is_match(text) {
                    let line_number = index + 1;
                    result.add_error(
                        format!("Line {}: Potentially unsafe operation: {}", line_number, pattern.label),
                        Some(line_number),
                    );
                    result.add_suggestion(pattern.remedy);
                }
            }
        }
    }

    fn check_smells(&self, code: &str, result: &mut ValidationResult) {
        let strict = self.config.validation_level == ValidationLevel::Strict;
        for (index, line) in code.lines().enumerate() {
            let line_number = index + 1;
            for smell in SMELLS.iter() {
                if (strict || !smell.strict_only) && smell.regex.is_match(line) {
                    result.add_warning(format!("Line {}: {}", line_number, smell.message));
                }
            }
            let length = line.chars().count();
            if length > self.config.max_line_length {
                result.add_warning(format!(
                    "Line {} exceeds {} chars ({})",
                    line_number, self.config.max_line_length, length
                ));
            }
        }
    }
}

fn render_alias(alias: &crate::python::ast::Alias) -> String {
    match &alias.asname {
        Some(asname) => format!("{} as {}", alias.name, asname),
        None => alias.name.clone(),
    }
}

/// Import statements at module level and inside definitions or blocks
fn collect_imports<'m>(body: &'m [Stmt], out: &mut Vec<&'m Stmt>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => out.push(stmt),
            StmtKind::If { body, orelse, .. } => {
                collect_imports(body, out);
                collect_imports(orelse, out);
            }
            StmtKind::Try { body, handlers, orelse, finalbody, .. } => {
                collect_imports(body, out);
                for handler in handlers {
                    collect_imports(&handler.body, out);
                }
                collect_imports(orelse, out);
                collect_imports(finalbody, out);
            }
            _ => {}
        }
    }
}
