/*!
 * Tokenizer for the Python subset.
 *
 * Produces a flat token stream with explicit `Newline`, `Indent` and
 * `Dedent` tokens. Newlines inside brackets and after a backslash are
 * joined, comments and blank lines are dropped, and f-string replacement
 * fields are extracted so the parser can analyse their expressions.
 */

use super::SyntaxError;

/// Position of a character in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKind {
    Plain,
    Bytes,
    Format,
}

/// Source of one `{...}` replacement field inside an f-string
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSource {
    pub text: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrLiteral {
    pub value: String,
    pub kind: StrKind,
    pub fields: Vec<FieldSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(String),
    Str(StrLiteral),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Pos,
    pub end: Pos,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Op(o) if o == op)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n == name)
    }
}

/// Operators ordered longest first so greedy matching works
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "<<", ">>", "<=", ">=", "==",
    "!=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@",
    "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

const TAB_SIZE: usize = 8;

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
    line: usize,
    column: usize,
    base_offset: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: Vec<(char, Pos)>,
    /// Fragments (f-string fields) start inside an implicit bracket
    fragment: bool,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            idx: 0,
            line: 1,
            column: 0,
            base_offset: 0,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            fragment: false,
            at_line_start: true,
        }
    }

    /// Lexer for an expression embedded elsewhere, positioned at `origin`
    pub fn for_fragment(source: &'a str, origin: Pos) -> Self {
        let mut lexer = Self::new(source);
        lexer.line = origin.line;
        lexer.column = origin.column;
        lexer.base_offset = origin.offset;
        lexer.fragment = true;
        lexer.at_line_start = false;
        lexer
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() && !self.fragment {
                if !self.handle_indentation()? {
                    break;
                }
                // a blank or comment-only line was consumed; measure the next one
                if self.at_line_start {
                    continue;
                }
            }

            let Some(c) = self.peek() else {
                break;
            };

            match c {
                ' ' | '\t' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    let start = self.pos();
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some('\r') => {
                            self.advance();
                            if self.peek() == Some('\n') {
                                self.advance();
                            }
                        }
                        None => {
                            return Err(self.error_at("unexpected EOF while parsing", start));
                        }
                        _ => {
                            return Err(self.error_at(
                                "unexpected character after line continuation character",
                                start,
                            ));
                        }
                    }
                }
                '\n' | '\r' => {
                    self.advance();
                    if c == '\r' && self.peek() == Some('\n') {
                        self.advance();
                    }
                    if self.brackets.is_empty() && !self.fragment {
                        self.push_newline();
                        self.at_line_start = true;
                    }
                }
                c if is_ident_start(c) => self.lex_name_or_string()?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.lex_number()?,
                '\'' | '"' => {
                    let start = self.pos();
                    self.lex_string(start, "")?;
                }
                _ => self.lex_operator()?,
            }
        }

        if let Some((open, pos)) = self.brackets.last().copied() {
            return Err(self.error_at(&format!("'{}' was never closed", open), pos));
        }

        let end = self.pos();
        if !self.fragment {
            self.push_newline();
            while self.indents.len() > 1 {
                self.indents.pop();
                self.push(TokenKind::Dedent, end, end);
            }
        }
        self.push(TokenKind::EndMarker, end, end);
        Ok(self.tokens)
    }

    /// Measures leading whitespace of a physical line and emits indent tokens.
    /// Returns false at end of input.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0;
        let line_start = self.pos();
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => return Ok(false),
            Some('#') | Some('\n') | Some('\r') => {
                // blank or comment-only line: no indentation change
                if self.peek() == Some('#') {
                    self.skip_comment();
                }
                if let Some(c) = self.peek() {
                    self.advance();
                    if c == '\r' && self.peek() == Some('\n') {
                        self.advance();
                    }
                }
                return Ok(true);
            }
            Some('\\') => {
                // continuation on an otherwise blank line keeps the current level
                self.at_line_start = false;
                return Ok(true);
            }
            _ => {}
        }

        self.at_line_start = false;
        let here = self.pos();
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, line_start, here);
        } else if width < current {
            while self.indents.last().is_some_and(|&top| top > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, here, here);
            }
            if self.indents.last() != Some(&width) {
                return Err(self.error_at(
                    "unindent does not match any outer indentation level",
                    here,
                ));
            }
        }
        Ok(true)
    }

    fn lex_name_or_string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('\'') | Some('"')) && is_string_prefix(&name) {
            return self.lex_string(start, &name);
        }

        let end = self.pos();
        self.push(TokenKind::Name(name), start, end);
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos();
        let mut text = String::new();

        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            for _ in 0..2 {
                if let Some(c) = self.advance() {
                    text.push(c);
                }
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == '_' {
                    if c != '_' {
                        text.push(c);
                    }
                    self.advance();
                } else {
                    break;
                }
            }
        } else {
            self.take_digits(&mut text);
            if self.peek() == Some('.') {
                text.push('.');
                self.advance();
                self.take_digits(&mut text);
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_at = if sign { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    for _ in 0..digit_at {
                        if let Some(c) = self.advance() {
                            text.push(c);
                        }
                    }
                    self.take_digits(&mut text);
                }
            }
            if matches!(self.peek(), Some('j' | 'J')) {
                text.push('j');
                self.advance();
            }
        }

        if self.peek().is_some_and(is_ident_start) {
            let pos = self.pos();
            return Err(self.error_at("invalid decimal literal", pos));
        }

        let end = self.pos();
        self.push(TokenKind::Number(text), start, end);
        Ok(())
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, start: Pos, prefix: &str) -> Result<(), SyntaxError> {
        let lower = prefix.to_ascii_lowercase();
        let raw = lower.contains('r');
        let kind = if lower.contains('f') {
            StrKind::Format
        } else if lower.contains('b') {
            StrKind::Bytes
        } else {
            StrKind::Plain
        };

        let quote = self.advance().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let content_start = self.idx;
        let content_pos = self.pos();
        let content_end;
        loop {
            let Some(c) = self.peek() else {
                return Err(self.unterminated(start, triple));
            };
            if c == '\\' {
                self.advance();
                if self.peek().is_some() {
                    self.advance();
                }
                continue;
            }
            if (c == '\n' || c == '\r') && !triple {
                return Err(self.unterminated(start, triple));
            }
            if c == quote {
                if !triple {
                    content_end = self.idx;
                    self.advance();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    content_end = self.idx;
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
            }
            self.advance();
        }

        let raw_content: String = self.chars[content_start..content_end].iter().map(|(_, c)| *c).collect();
        let value = if raw { raw_content.clone() } else { unescape(&raw_content) };
        let fields = if kind == StrKind::Format {
            extract_fields(&raw_content, content_pos)
                .map_err(|message| self.error_at(&message, content_pos))?
        } else {
            Vec::new()
        };

        let end = self.pos();
        self.push(TokenKind::Str(StrLiteral { value, kind, fields }), start, end);
        Ok(())
    }

    fn unterminated(&self, start: Pos, triple: bool) -> SyntaxError {
        let message = if triple {
            format!("unterminated triple-quoted string literal (detected at line {})", self.line)
        } else {
            format!("unterminated string literal (detected at line {})", start.line)
        };
        self.error_at(&message, start)
    }

    fn lex_operator(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos();
        let rest = self.remaining();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)).copied() else {
            let c = self.peek().unwrap_or(' ');
            return Err(self.error_at(&format!("invalid character '{}' (U+{:04X})", c, c as u32), start));
        };

        for _ in 0..op.chars().count() {
            self.advance();
        }

        match op {
            "(" | "[" | "{" => {
                let open = op.chars().next().unwrap_or('(');
                self.brackets.push((open, start));
            }
            ")" | "]" | "}" => {
                let close = op.chars().next().unwrap_or(')');
                match self.brackets.pop() {
                    None => {
                        return Err(self.error_at(&format!("unmatched '{}'", close), start));
                    }
                    Some((open, _)) if matching_close(open) != close => {
                        return Err(self.error_at(
                            &format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                close, open
                            ),
                            start,
                        ));
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }

        let end = self.pos();
        self.push(TokenKind::Op(op), start, end);
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.advance();
        }
    }

    /// Ends a logical line; the token sits right after the line's last token
    fn push_newline(&mut self) {
        let Some(last) = self.tokens.last() else {
            return;
        };
        if matches!(last.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent) {
            return;
        }
        let at = last.end;
        self.push(TokenKind::Newline, at, at);
    }

    fn push(&mut self, kind: TokenKind, start: Pos, end: Pos) {
        self.tokens.push(Token { kind, start, end });
    }

    fn pos(&self) -> Pos {
        let offset = self.chars.get(self.idx).map(|(o, _)| *o).unwrap_or(self.source.len());
        Pos { line: self.line, column: self.column, offset: self.base_offset + offset }
    }

    fn remaining(&self) -> &str {
        let offset = self.chars.get(self.idx).map(|(o, _)| *o).unwrap_or(self.source.len());
        &self.source[offset..]
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' || (c == '\r' && self.peek() != Some('\n')) {
            self.line += 1;
            self.column = 0;
        } else if c != '\r' {
            self.column += 1;
        }
        Some(c)
    }

    fn error_at(&self, message: &str, pos: Pos) -> SyntaxError {
        SyntaxError::new(message, pos.line, pos.column)
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn is_string_prefix(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
    )
}

fn matching_close(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Resolves the common backslash escapes; unknown escapes are kept verbatim
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Finds the expression part of every `{...}` field in f-string content.
/// Positions are reported relative to `origin`, the first content character.
fn extract_fields(content: &str, origin: Pos) -> Result<Vec<FieldSource>, String> {
    let chars: Vec<(usize, char)> = content.char_indices().collect();
    let mut fields = Vec::new();
    let mut i = 0;
    let mut line = origin.line;
    let mut column = origin.column;

    // advance helper tracking line/column across newlines in triple-quoted strings
    let step = |c: char, line: &mut usize, column: &mut usize| {
        if c == '\n' {
            *line += 1;
            *column = 0;
        } else {
            *column += 1;
        }
    };

    while i < chars.len() {
        let c = chars[i].1;
        if c == '{' {
            if chars.get(i + 1).map(|(_, n)| *n) == Some('{') {
                step(c, &mut line, &mut column);
                step('{', &mut line, &mut column);
                i += 2;
                continue;
            }
            step(c, &mut line, &mut column);
            i += 1;
            let expr_start = i;
            let field_pos = Pos { line, column, offset: origin.offset + chars.get(i).map(|(o, _)| *o).unwrap_or(content.len()) };
            let mut depth = 0usize;
            let mut quote: Option<char> = None;
            let mut expr_end = None;
            while i < chars.len() {
                let ch = chars[i].1;
                if let Some(q) = quote {
                    if ch == q {
                        quote = None;
                    }
                } else {
                    match ch {
                        '\'' | '"' => quote = Some(ch),
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' => depth = depth.saturating_sub(1),
                        '}' if depth > 0 => depth -= 1,
                        '}' => {
                            expr_end.get_or_insert(i);
                            break;
                        }
                        '!' if depth == 0 && chars.get(i + 1).map(|(_, n)| *n) != Some('=') => {
                            expr_end.get_or_insert(i);
                        }
                        ':' if depth == 0 => {
                            expr_end.get_or_insert(i);
                        }
                        _ => {}
                    }
                }
                step(ch, &mut line, &mut column);
                i += 1;
            }
            if i >= chars.len() {
                return Err("f-string: expecting '}'".to_string());
            }
            // closing brace
            step('}', &mut line, &mut column);
            i += 1;

            let end = expr_end.unwrap_or(expr_start);
            let mut text: String = chars[expr_start..end].iter().map(|(_, c)| *c).collect();
            let trimmed = text.trim_end();
            if trimmed.ends_with('=') && !trimmed.ends_with("==") && !trimmed.ends_with("!=")
                && !trimmed.ends_with("<=") && !trimmed.ends_with(">=")
            {
                text = trimmed[..trimmed.len() - 1].to_string();
            }
            if text.trim().is_empty() {
                return Err("f-string: empty expression not allowed".to_string());
            }
            fields.push(FieldSource { text, pos: field_pos });
            continue;
        }
        step(c, &mut line, &mut column);
        i += 1;
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_simple_assignment_should_emit_newline_and_endmarker() {
        let tokens = kinds("x = 1\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("="),
                TokenKind::Number("1".into()),
                TokenKind::Newline,
                TokenKind::EndMarker
            ]
        );
    }

    #[test]
    fn test_tokenize_block_should_emit_indent_and_dedent() {
        let tokens = kinds("if x:\n    y\nz\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
    }

    #[test]
    fn test_tokenize_brackets_should_join_lines() {
        let tokens = kinds("f(a,\n  b)\n");
        let newlines = tokens.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_tokenize_unclosed_paren_should_report_opening_position() {
        let err = Lexer::new("print((1, 2)\n").tokenize().unwrap_err();
        assert!(err.message.contains("was never closed"));
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_tokenize_unterminated_string_should_fail() {
        let err = Lexer::new("x = 'abc\n").tokenize().unwrap_err();
        assert!(err.message.starts_with("unterminated string literal"));
    }

    #[test]
    fn test_tokenize_bad_dedent_should_fail() {
        let err = Lexer::new("if x:\n    y\n  z\n").tokenize().unwrap_err();
        assert!(err.message.contains("unindent does not match"));
    }

    #[test]
    fn test_tokenize_fstring_should_extract_fields() {
        let tokens = Lexer::new("f\"{name!r} is {age:>3} {{x}} {a=}\"").tokenize().unwrap();
        let TokenKind::Str(lit) = &tokens[0].kind else {
            panic!("expected string token");
        };
        let texts: Vec<&str> = lit.fields.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["name", "age", "a"]);
    }

    #[test]
    fn test_tokenize_comment_lines_should_not_change_indentation() {
        let tokens = kinds("def f():\n    x = 1\n# note\n    return x\n");
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(dedents, 1);
    }

    #[test]
    fn test_tokenize_blank_line_inside_body_should_keep_indentation() {
        let tokens = Lexer::new("def f(a):\n    x = a + 1\n\n    return x\n").tokenize().unwrap();
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(kinds.iter().filter(|k| ***k == TokenKind::Indent).count(), 1);
        assert_eq!(kinds.iter().filter(|k| ***k == TokenKind::Dedent).count(), 1);
        let ret = tokens.iter().find(|t| t.kind == TokenKind::Name("return".into())).unwrap();
        assert_eq!((ret.start.line, ret.start.column), (4, 4));
    }

    #[test]
    fn test_tokenize_indented_comment_and_blank_lines_should_not_shift_columns() {
        let tokens = kinds("class A:\n    # note\n\n\n    def m(self):\n        pass\n");
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Indent).count(), 2);
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Dedent).count(), 2);
    }
}
