/*!
 * Splitting parsed blocks into program sections.
 *
 * Each top-level statement is cut out of its block as whole source lines
 * together with the comment lines directly above it, then filed as the
 * module docstring, an import, a function, a class, a global assignment or
 * main code.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::formatting::dedent;
use super::imports::ImportSet;
use crate::python::ast::*;

pub const CONSTANTS_HEADING: &str = "# Constants";
pub const VARIABLES_HEADING: &str = "# Global variables";

static CONSTANT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_*[A-Z][A-Z0-9_]*$").unwrap());

/// A named top-level definition and its source
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub code: String,
    pub is_constant: bool,
}

#[derive(Debug, Default)]
pub struct Sections {
    pub docstring: Option<String>,
    pub imports: ImportSet,
    pub functions: Vec<Definition>,
    pub classes: Vec<Definition>,
    pub globals: Vec<Assignment>,
    pub main: Vec<String>,
    /// Some block already ran its main code under a `__main__` guard
    pub main_guard: bool,
}

/// Source text of one top-level statement
pub struct Segment<'m> {
    pub stmt: &'m Stmt,
    pub text: String,
}

/// Cuts `body` out of `source` as whole lines, attaching the comment lines
/// found between the previous statement and each statement.
///
/// `after_line` is the last line before the first statement that belongs to
/// someone else (0 for a module). Statements sharing a line with a neighbour
/// are cut by their exact span instead.
pub fn segments<'m>(source: &str, body: &'m [Stmt], after_line: usize) -> (Vec<Segment<'m>>, Vec<String>) {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut result = Vec::with_capacity(body.len());
    let mut previous_end = after_line;

    for (index, stmt) in body.iter().enumerate() {
        let shares_line = (index > 0 && body[index - 1].span.end_line == stmt.span.line)
            || body.get(index + 1).is_some_and(|next| next.span.line == stmt.span.end_line);

        let comments = comment_lines(&lines, previous_end, stmt.span.line.saturating_sub(1));
        let own = if shares_line {
            stmt.span.slice(source).unwrap_or_default().trim().to_string()
        } else {
            line_range(&lines, stmt.span.line, stmt.span.end_line)
        };

        let mut text = comments.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(own.trim_end());
        result.push(Segment { stmt, text });
        previous_end = previous_end.max(stmt.span.end_line);
    }

    let trailing = comment_lines(&lines, previous_end, lines.len());
    (result, trailing)
}

/// Comment lines in the 1-based range `(after, through]`, minus section headings
fn comment_lines(lines: &[&str], after: usize, through: usize) -> Vec<String> {
    if through <= after {
        return Vec::new();
    }
    lines
        .iter()
        .take(through.min(lines.len()))
        .skip(after)
        .map(|line| line.trim_end())
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with('#') && trimmed != CONSTANTS_HEADING && trimmed != VARIABLES_HEADING
        })
        .map(str::to_string)
        .collect()
}

fn line_range(lines: &[&str], first: usize, last: usize) -> String {
    let first = first.max(1);
    let last = last.max(first).min(lines.len());
    lines[first - 1..last].join("\n")
}

/// True for `if __name__ == "__main__":` without an else branch
pub fn is_main_guard(stmt: &Stmt) -> bool {
    let StmtKind::If { test, orelse, .. } = &stmt.kind else {
        return false;
    };
    if !orelse.is_empty() {
        return false;
    }
    match &test.kind {
        ExprKind::Compare { left, ops, comparators } => {
            ops.len() == 1
                && ops[0] == CmpOp::Eq
                && left.as_name() == Some("__name__")
                && comparators.first().is_some_and(|c| {
                    matches!(&c.kind, ExprKind::Constant(Constant::Str(s)) if s == "__main__")
                })
        }
        _ => false,
    }
}

fn is_constant_target(target: &Expr) -> bool {
    match &target.kind {
        ExprKind::Name { id, .. } => CONSTANT_NAME.is_match(id),
        ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
            !elts.is_empty() && elts.iter().all(is_constant_target)
        }
        _ => false,
    }
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files every top-level statement of a parsed block
    pub fn add_module(&mut self, source: &str, module: &Module, allow_docstring: bool) {
        let (parts, trailing) = segments(source, &module.body, 0);

        for (index, segment) in parts.into_iter().enumerate() {
            let stmt = segment.stmt;
            match &stmt.kind {
                _ if index == 0 && stmt.is_docstring() => {
                    if allow_docstring && self.docstring.is_none() {
                        self.docstring = Some(segment.text);
                    }
                }
                StmtKind::Import(_) | StmtKind::ImportFrom { .. } => self.imports.add_statement(stmt),
                StmtKind::FunctionDef(def) => {
                    self.functions.push(Definition { name: def.name.clone(), code: segment.text })
                }
                StmtKind::ClassDef(def) => {
                    self.classes.push(Definition { name: def.name.clone(), code: segment.text })
                }
                StmtKind::Assign { targets, .. } => self.globals.push(Assignment {
                    is_constant: targets.iter().all(is_constant_target),
                    code: segment.text,
                }),
                StmtKind::AnnAssign { target, .. } => self.globals.push(Assignment {
                    is_constant: is_constant_target(target),
                    code: segment.text,
                }),
                StmtKind::If { body, .. } if is_main_guard(stmt) => {
                    self.main_guard = true;
                    let (inner, inner_trailing) = segments(source, body, stmt.span.line);
                    self.main.extend(inner.into_iter().map(|s| dedent(&s.text)));
                    if !inner_trailing.is_empty() {
                        self.main.push(dedent(&inner_trailing.join("\n")));
                    }
                }
                _ => self.main.push(segment.text),
            }
        }
        if !trailing.is_empty() {
            self.main.push(trailing.join("\n"));
        }
    }

    /// Adds a block that could not be parsed as one main-code chunk
    pub fn add_verbatim(&mut self, source: &str) {
        let text = source.trim_matches('\n').trim_end();
        if !text.is_empty() {
            self.main.push(dedent(text));
        }
    }

    /// Functions deduplicated by name; the last body wins at the first position
    pub fn merged_functions(&self) -> Vec<Definition> {
        merge_definitions(&self.functions)
    }

    pub fn merged_classes(&self) -> Vec<Definition> {
        merge_definitions(&self.classes)
    }

    /// Constants under their heading, then variables under theirs
    pub fn render_globals(&self) -> String {
        let constants: Vec<&str> =
            self.globals.iter().filter(|a| a.is_constant).map(|a| a.code.as_str()).collect();
        let variables: Vec<&str> =
            self.globals.iter().filter(|a| !a.is_constant).map(|a| a.code.as_str()).collect();

        let mut groups = Vec::new();
        if !constants.is_empty() {
            groups.push(format!("{}\n{}", CONSTANTS_HEADING, constants.join("\n")));
        }
        if !variables.is_empty() {
            groups.push(format!("{}\n{}", VARIABLES_HEADING, variables.join("\n")));
        }
        groups.join("\n\n")
    }
}

pub fn merge_definitions(definitions: &[Definition]) -> Vec<Definition> {
    let mut merged: Vec<Definition> = Vec::new();
    for definition in definitions {
        match merged.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => existing.code = definition.code.clone(),
            None => merged.push(definition.clone()),
        }
    }
    merged
}
