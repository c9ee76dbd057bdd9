/*!
 * Improvement suggestions.
 *
 * Nothing here affects validity. Tree-based checks cover naming, loops,
 * docstrings and default arguments; line regexes cover spacing and
 * security hygiene. The returned list has no duplicates.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::python::ast::*;
use crate::python::visit::{self, Visitor};

/// Functions with more statements than this should carry a docstring
const DOCSTRING_MIN_STATEMENTS: usize = 5;

/// Boolean expressions with more operands than this are hard to read
const MAX_BOOL_OPERANDS: usize = 3;

static SNAKE_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_{0,2}[a-z][a-z0-9_]*_{0,2}$").unwrap());
static CAP_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_?[A-Z][A-Za-z0-9]*$").unwrap());
static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap());
static COMMA_NO_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r",[^\s)\]}]").unwrap());
static TIGHT_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w(==|!=|<=|>=|\+=|-=|\*=|/=)\w").unwrap());
static STRING_CONCAT_IN_LOOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*for\b.*:\s*\n.*\+=\s*f?["']"#).unwrap());
static TYPE_EQUALITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btype\([^)]+\)\s*==").unwrap());
static NONE_EQUALITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=!]=\s*None\b").unwrap());
static WITH_STATEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(async\s+)?with\b").unwrap());
static HARDCODED_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|secret|api_key|token)\s*=\s*["'][^"']+["']"#).unwrap()
});
static SQL_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(select|insert|update|delete)\b.*\b(from|into|set|where)\b").unwrap());

/// Collects suggestions for parsed code
pub fn suggest(module: &Module, code: &str) -> Vec<String> {
    let mut collector = SuggestionCollector::default();
    visit::walk_body(&mut collector, &module.body);

    let mut suggestions = collector.suggestions;
    for (list_name, count) in collector.appends_in_loops {
        if count >= 2 {
            suggestions.push(format!(
                "Consider using a list comprehension instead of repeated append() for '{}'",
                list_name
            ));
        }
    }
    suggestions.extend(line_suggestions(code));

    let mut unique = Vec::with_capacity(suggestions.len());
    for suggestion in suggestions {
        if !unique.contains(&suggestion) {
            unique.push(suggestion);
        }
    }
    unique
}

fn line_suggestions(code: &str) -> Vec<String> {
    let mut suggestions = Vec::new();

    for (index, line) in code.lines().enumerate() {
        let line_number = index + 1;
        let bare = STRING_LITERAL.replace_all(crate::blocks::scoring::strip_comment(line), "\"\"");
        if COMMA_NO_SPACE.is_match(&bare) {
            suggestions.push(format!("Line {}: Add a space after commas", line_number));
        }
        if TIGHT_OPERATOR.is_match(&bare) {
            suggestions.push(format!("Line {}: Add spaces around operators", line_number));
        }
    }

    if STRING_CONCAT_IN_LOOP.is_match(code) {
        suggestions.push("Use str.join() for string concatenation in loops".to_string());
    }
    if TYPE_EQUALITY.is_match(code) {
        suggestions.push("Use isinstance() instead of type() == for type checking".to_string());
    }
    if NONE_EQUALITY.is_match(code) {
        suggestions.push("Use 'is None' or 'is not None' instead of == None".to_string());
    }
    if code.contains("open(") && !WITH_STATEMENT.is_match(code) {
        suggestions.push("Use a 'with' statement for file operations".to_string());
    }
    if HARDCODED_SECRET.is_match(code) {
        suggestions.push(
            "Avoid hardcoding credentials - use environment variables or config files".to_string(),
        );
    }
    let interpolated = code.contains("%s") || code.contains("f\"") || code.contains("f'") || code.contains(".format(");
    if interpolated && SQL_KEYWORD.is_match(code) {
        suggestions.push("Use parameterized queries to prevent SQL injection".to_string());
    }
    if code.contains("../") || code.contains("..\\") {
        suggestions.push("Validate file paths to prevent directory traversal attacks".to_string());
    }
    suggestions
}

#[derive(Default)]
struct SuggestionCollector {
    suggestions: Vec<String>,
    loop_depth: usize,
    appends_in_loops: BTreeMap<String, usize>,
}

impl SuggestionCollector {
    fn check_function(&mut self, def: &FunctionDef) {
        if !SNAKE_CASE.is_match(&def.name) {
            self.suggestions.push(format!("Function '{}' should use snake_case naming", def.name));
        }
        if def.body.len() > DOCSTRING_MIN_STATEMENTS && !def.body.first().is_some_and(Stmt::is_docstring) {
            self.suggestions.push(format!("Function '{}' is missing a docstring", def.name));
        }
        let mutable_default = def.params.params.iter().filter_map(|p| p.default.as_ref()).any(|default| {
            matches!(
                default.kind,
                ExprKind::List { .. } | ExprKind::Dict { .. } | ExprKind::Set(_)
            )
        });
        if mutable_default {
            self.suggestions.push(format!(
                "Function '{}' has a mutable default argument; use None and create it inside",
                def.name
            ));
        }
    }

    fn check_class(&mut self, def: &ClassDef) {
        if !CAP_WORDS.is_match(&def.name) {
            self.suggestions.push(format!("Class '{}' should use CapWords naming", def.name));
        }
        if !def.body.first().is_some_and(Stmt::is_docstring) {
            self.suggestions.push(format!("Class '{}' is missing a docstring", def.name));
        }
    }

    fn check_for(&mut self, iter: &Expr) {
        let ExprKind::Call { func, args, .. } = &iter.kind else {
            return;
        };
        let wraps_len = matches!(
            args.first().map(|arg| &arg.kind),
            Some(ExprKind::Call { func: inner, .. }) if inner.as_name() == Some("len")
        );
        if func.as_name() == Some("range") && wraps_len {
            self.suggestions.push("Use enumerate() instead of range(len())".to_string());
        }
    }
}

impl<'ast> Visitor<'ast> for SuggestionCollector {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                self.check_function(def);
                let outer = std::mem::take(&mut self.loop_depth);
                visit::walk_stmt(self, stmt);
                self.loop_depth = outer;
            }
            StmtKind::ClassDef(def) => {
                self.check_class(def);
                visit::walk_stmt(self, stmt);
            }
            StmtKind::For { iter, .. } => {
                self.check_for(iter);
                self.loop_depth += 1;
                visit::walk_stmt(self, stmt);
                self.loop_depth -= 1;
            }
            StmtKind::While { .. } => {
                self.loop_depth += 1;
                visit::walk_stmt(self, stmt);
                self.loop_depth -= 1;
            }
            _ => visit::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        match &expr.kind {
            ExprKind::Call { func, .. } if self.loop_depth > 0 => {
                if let ExprKind::Attribute { value, attr, .. } = &func.kind {
                    if let Some(list_name) = value.as_name().filter(|_| attr == "append") {
                        *self.appends_in_loops.entry(list_name.to_string()).or_default() += 1;
                    }
                }
            }
            ExprKind::BoolOp { values, .. } if values.len() > MAX_BOOL_OPERANDS => {
                self.suggestions.push("Consider breaking down complex boolean expressions".to_string());
            }
            ExprKind::Lambda { .. } => {
                self.suggestions.push("Consider using a named function instead of lambda for clarity".to_string());
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::parse_module;

    fn suggestions_for(code: &str) -> Vec<String> {
        suggest(&parse_module(code).unwrap(), code)
    }

    #[test]
    fn test_naming_conventions_should_be_suggested() {
        let found = suggestions_for("def calcSum(a, b):\n    return a + b\n\nclass my_thing:\n    '''Doc.'''\n");
        assert!(found.contains(&"Function 'calcSum' should use snake_case naming".to_string()));
        assert!(found.contains(&"Class 'my_thing' should use CapWords naming".to_string()));
    }

    #[test]
    fn test_range_len_should_suggest_enumerate() {
        let found = suggestions_for("items = [1]\nfor i in range(len(items)):\n    print(items[i])\n");
        assert!(found.contains(&"Use enumerate() instead of range(len())".to_string()));
    }

    #[test]
    fn test_repeated_append_should_suggest_comprehension() {
        let code = "out = []\nfor x in range(3):\n    out.append(x)\n    out.append(x * 2)\n";
        let found = suggestions_for(code);
        assert!(found.iter().any(|s| s.contains("list comprehension") && s.contains("'out'")));
    }

    #[test]
    fn test_best_practice_checks() {
        let code = "def add(item, bucket=[]):\n    if type(item) == int and bucket != None:\n        bucket.append(item)\n    return bucket\n";
        let found = suggestions_for(code);
        assert!(found.iter().any(|s| s.contains("mutable default")));
        assert!(found.iter().any(|s| s.contains("isinstance()")));
        assert!(found.iter().any(|s| s.contains("is not None")));
    }

    #[test]
    fn test_security_hygiene_checks() {
        let code = "password = 'hunter2'\nquery = \"SELECT * FROM users WHERE id = %s\" % uid\npath = '../etc/passwd'\n";
        let found = suggestions_for(code);
        assert!(found.iter().any(|s| s.contains("hardcoding credentials")));
        assert!(found.iter().any(|s| s.contains("parameterized queries")));
        assert!(found.iter().any(|s| s.contains("directory traversal")));
    }

    #[test]
    fn test_spacing_inside_strings_should_be_ignored() {
        let found = suggestions_for("label = 'a,b==c'\n");
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn test_results_should_be_deduplicated() {
        let code = "f = lambda x: x\ng = lambda y: y\n";
        let found = suggestions_for(code);
        assert_eq!(found.iter().filter(|s| s.contains("lambda")).count(), 1);
    }
}
