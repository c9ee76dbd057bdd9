/*!
 * Python front end: tokenizer, parser and syntax tree.
 *
 * Generated code is always parsed through these entry points; the AST
 * cache wraps [`parse`] to avoid re-parsing identical text.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod visit;

pub use ast::{Expr, ExprKind, Module, Span, Stmt, StmtKind};
use lexer::Lexer;
use parser::Parser;

/// How the source should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// A sequence of statements (a module)
    #[default]
    Exec,
    /// A single expression, wrapped as one expression statement
    Eval,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Exec => "exec",
            ParseMode::Eval => "eval",
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A syntax error with its location and, once attached, the offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub snippet: Option<String>,
}

impl SyntaxError {
    pub fn new(message: &str, line: usize, column: usize) -> Self {
        Self { message: message.to_string(), line, column, snippet: None }
    }

    /// Attaches the source line the error points at
    pub fn with_snippet(mut self, source: &str) -> Self {
        if self.line > 0 {
            self.snippet = source.lines().nth(self.line - 1).map(|l| l.to_string());
        }
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column + 1)
    }
}

impl std::error::Error for SyntaxError {}

/// Parses `source` in the given mode
pub fn parse(source: &str, mode: ParseMode) -> Result<Module, SyntaxError> {
    let result = match mode {
        ParseMode::Exec => parse_tokens(source).and_then(|tokens| Parser::new(tokens).parse_module()),
        ParseMode::Eval => parse_tokens(source).and_then(|tokens| {
            let expr = Parser::new(tokens).parse_expression_input()?;
            let span = expr.span;
            Ok(Module { body: vec![Stmt::new(StmtKind::Expr(expr), span)] })
        }),
    };
    result.map_err(|err| err.with_snippet(source))
}

pub fn parse_module(source: &str) -> Result<Module, SyntaxError> {
    parse(source, ParseMode::Exec)
}

pub fn parse_expression(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = parse_tokens(source).map_err(|err| err.with_snippet(source))?;
    Parser::new(tokens).parse_expression_input().map_err(|err| err.with_snippet(source))
}

fn parse_tokens(source: &str) -> Result<Vec<lexer::Token>, SyntaxError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_should_carry_snippet() {
        let err = parse_module("x = 1\ny = (2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.snippet.as_deref(), Some("y = (2"));
    }

    #[test]
    fn test_parse_expression_should_reject_statements() {
        assert!(parse_expression("x = 1").is_err());
        assert!(parse_expression("x + 1").is_ok());
    }
}
