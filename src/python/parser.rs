/*!
 * Recursive-descent parser producing the [`Module`] tree.
 *
 * Follows the precedence levels of the Python grammar. Error messages use
 * the same wording as the reference interpreter so that downstream
 * suggestion heuristics can key on them.
 */

use super::ast::*;
use super::lexer::{Lexer, Pos, StrKind, StrLiteral, Token, TokenKind};
use super::SyntaxError;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

type PResult<T> = Result<T, SyntaxError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prev_end: Pos,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, prev_end: Pos::default() }
    }

    pub fn parse_module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.eat_newline() {
                continue;
            }
            if matches!(self.peek().kind, TokenKind::Indent) {
                return Err(self.error_here("unexpected indent"));
            }
            if matches!(self.peek().kind, TokenKind::Dedent) {
                self.advance();
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    /// Parses a single expression followed by end of input
    pub fn parse_expression_input(&mut self) -> PResult<Expr> {
        while self.eat_newline() {}
        let expr = self.parse_star_expressions()?;
        while self.eat_newline() {}
        if !self.at_end() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    // ----- token helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.prev_end = token.end;
        token
    }

    /// Consumes a dedent without extending spans over the whitespace it covers
    fn consume_dedent(&mut self) {
        let end = self.prev_end;
        self.advance();
        self.prev_end = end;
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::EndMarker)
    }

    fn check_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn check_keyword(&self, kw: &str) -> bool {
        self.peek().is_name(kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_newline(&mut self) -> bool {
        if matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> PResult<Token> {
        if self.check_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected '{}'", op)))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<Token> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected '{}'", kw)))
        }
    }

    fn expect_name(&mut self) -> PResult<(String, Token)> {
        match &self.peek().kind {
            TokenKind::Name(name) if !is_keyword(name) => {
                let name = name.clone();
                let token = self.advance();
                Ok((name, token))
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    fn is_name_token(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if !is_keyword(n))
    }

    fn span_from(&self, start: Pos) -> Span {
        let end = if self.prev_end.offset >= start.offset { self.prev_end } else { start };
        Span {
            line: start.line,
            column: start.column,
            end_line: end.line,
            end_column: end.column,
            start: start.offset,
            end: end.offset,
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(message, token.start.line, token.start.column)
    }

    fn invalid_syntax(&self) -> SyntaxError {
        self.error_here("invalid syntax")
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek().kind {
            TokenKind::Indent => self.error_here("unexpected indent"),
            _ => self.invalid_syntax(),
        }
    }

    // ----- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        let token = self.peek().clone();
        if let TokenKind::Name(name) = &token.kind {
            match name.as_str() {
                "def" => return Ok(vec![self.parse_function_def(Vec::new(), None, false)?]),
                "class" => return Ok(vec![self.parse_class_def(Vec::new(), None)?]),
                "if" => return Ok(vec![self.parse_if()?]),
                "while" => return Ok(vec![self.parse_while()?]),
                "for" => return Ok(vec![self.parse_for(None)?]),
                "try" => return Ok(vec![self.parse_try()?]),
                "with" => return Ok(vec![self.parse_with(None)?]),
                "async" => return Ok(vec![self.parse_async()?]),
                "match" => {
                    if let Some(stmt) = self.try_parse_match()? {
                        return Ok(vec![stmt]);
                    }
                }
                _ => {}
            }
        }
        if token.is_op("@") {
            return Ok(vec![self.parse_decorated()?]);
        }
        self.parse_simple_statements()
    }

    fn parse_simple_statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_statement()?];
        while self.eat_op(";") {
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker) {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }
        if !self.eat_newline() && !self.at_end() {
            return Err(self.unexpected());
        }
        Ok(stmts)
    }

    fn parse_simple_statement(&mut self) -> PResult<Stmt> {
        let start = self.peek().start;
        let token = self.peek().clone();
        let kind = match &token.kind {
            TokenKind::Name(name) => match name.as_str() {
                "pass" => {
                    self.advance();
                    StmtKind::Pass
                }
                "break" => {
                    self.advance();
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    StmtKind::Continue
                }
                "return" => {
                    self.advance();
                    let value = if self.at_statement_end() {
                        None
                    } else {
                        Some(self.parse_star_expressions()?)
                    };
                    StmtKind::Return(value)
                }
                "raise" => {
                    self.advance();
                    let mut exc = None;
                    let mut cause = None;
                    if !self.at_statement_end() {
                        exc = Some(self.parse_expression()?);
                        if self.eat_keyword("from") {
                            cause = Some(self.parse_expression()?);
                        }
                    }
                    StmtKind::Raise { exc, cause }
                }
                "global" | "nonlocal" => {
                    let is_global = name == "global";
                    self.advance();
                    let mut names = vec![self.expect_name()?.0];
                    while self.eat_op(",") {
                        names.push(self.expect_name()?.0);
                    }
                    if is_global { StmtKind::Global(names) } else { StmtKind::Nonlocal(names) }
                }
                "del" => {
                    self.advance();
                    let mut targets = vec![self.parse_bitwise_or()?];
                    while self.eat_op(",") {
                        if self.at_statement_end() {
                            break;
                        }
                        targets.push(self.parse_bitwise_or()?);
                    }
                    let targets = targets
                        .into_iter()
                        .map(|t| with_context(t, ExprContext::Del))
                        .collect::<PResult<Vec<_>>>()?;
                    StmtKind::Delete(targets)
                }
                "assert" => {
                    self.advance();
                    let test = self.parse_expression()?;
                    let msg = if self.eat_op(",") { Some(self.parse_expression()?) } else { None };
                    StmtKind::Assert { test, msg }
                }
                "import" => self.parse_import()?,
                "from" => self.parse_from_import()?,
                _ => self.parse_expression_statement()?,
            },
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker) || self.check_op(";")
    }

    fn parse_expression_statement(&mut self) -> PResult<StmtKind> {
        let first = if self.check_keyword("yield") {
            self.parse_yield()?
        } else {
            self.parse_star_expressions()?
        };

        if self.check_op(":") {
            self.advance();
            let target = single_target(first)?;
            let annotation = self.parse_expression()?;
            let value = if self.eat_op("=") { Some(self.parse_assignment_value()?) } else { None };
            return Ok(StmtKind::AnnAssign { target, annotation, value });
        }

        if let Some(op) = self.peek_augassign() {
            self.advance();
            let target = single_target(first)?;
            if matches!(target.kind, ExprKind::Tuple { .. } | ExprKind::List { .. }) {
                return Err(SyntaxError::new(
                    "'tuple' is an illegal expression for augmented assignment",
                    target.span.line,
                    target.span.column,
                ));
            }
            let value = self.parse_assignment_value()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if self.check_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.parse_assignment_value()?);
            }
            let value = exprs.pop().ok_or_else(|| self.invalid_syntax())?;
            let targets = exprs
                .into_iter()
                .map(|t| with_context(t, ExprContext::Store))
                .collect::<PResult<Vec<_>>>()?;
            return Ok(StmtKind::Assign { targets, value });
        }

        Ok(StmtKind::Expr(first))
    }

    fn parse_assignment_value(&mut self) -> PResult<Expr> {
        if self.check_keyword("yield") {
            self.parse_yield()
        } else {
            self.parse_star_expressions()
        }
    }

    fn peek_augassign(&self) -> Option<Operator> {
        let TokenKind::Op(op) = self.peek().kind else {
            return None;
        };
        Some(match op {
            "+=" => Operator::Add,
            "-=" => Operator::Sub,
            "*=" => Operator::Mult,
            "@=" => Operator::MatMult,
            "/=" => Operator::Div,
            "%=" => Operator::Mod,
            "**=" => Operator::Pow,
            "<<=" => Operator::LShift,
            ">>=" => Operator::RShift,
            "|=" => Operator::BitOr,
            "^=" => Operator::BitXor,
            "&=" => Operator::BitAnd,
            "//=" => Operator::FloorDiv,
            _ => return None,
        })
    }

    fn parse_import(&mut self) -> PResult<StmtKind> {
        self.expect_keyword("import")?;
        let mut names = vec![self.parse_alias(true)?];
        while self.eat_op(",") {
            names.push(self.parse_alias(true)?);
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> PResult<StmtKind> {
        self.expect_keyword("from")?;
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_keyword("import") {
            None
        } else {
            Some(self.parse_dotted_name()?)
        };
        if module.is_none() && level == 0 {
            return Err(self.invalid_syntax());
        }
        self.expect_keyword("import")?;

        let mut names = Vec::new();
        if self.check_op("*") {
            let token = self.advance();
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
                span: self.span_from(token.start),
            });
        } else if self.eat_op("(") {
            loop {
                if self.check_op(")") {
                    break;
                }
                names.push(self.parse_alias(false)?);
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
        } else {
            names.push(self.parse_alias(false)?);
            while self.eat_op(",") {
                names.push(self.parse_alias(false)?);
            }
        }
        if names.is_empty() {
            return Err(self.invalid_syntax());
        }
        Ok(StmtKind::ImportFrom { module, names, level })
    }

    fn parse_alias(&mut self, dotted: bool) -> PResult<Alias> {
        let start = self.peek().start;
        let name = if dotted { self.parse_dotted_name()? } else { self.expect_name()?.0 };
        let asname = if self.eat_keyword("as") { Some(self.expect_name()?.0) } else { None };
        Ok(Alias { name, asname, span: self.span_from(start) })
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?.0;
        while self.check_op(".") {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_name()?.0);
        }
        Ok(name)
    }

    /// Parses `':' block`, where `keyword` and `line` describe the header for error messages
    fn parse_block(&mut self, keyword: &str, line: usize) -> PResult<Vec<Stmt>> {
        if !self.check_op(":") {
            return Err(self.error_here("expected ':'"));
        }
        self.advance();

        if self.eat_newline() {
            if !matches!(self.peek().kind, TokenKind::Indent) {
                return Err(self.error_here(&format!(
                    "expected an indented block after '{}' statement on line {}",
                    keyword, line
                )));
            }
            self.advance();
            let mut body = Vec::new();
            loop {
                match self.peek().kind {
                    TokenKind::Dedent => {
                        self.consume_dedent();
                        break;
                    }
                    TokenKind::EndMarker => break,
                    TokenKind::Newline => {
                        self.advance();
                    }
                    TokenKind::Indent => return Err(self.error_here("unexpected indent")),
                    _ => body.extend(self.parse_statement()?),
                }
            }
            Ok(body)
        } else {
            if self.at_end() {
                return Err(self.error_here(&format!(
                    "expected an indented block after '{}' statement on line {}",
                    keyword, line
                )));
            }
            self.parse_simple_statements()
        }
    }

    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let start = self.peek().start;
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.parse_named_expression()?);
            if !self.eat_newline() {
                return Err(self.invalid_syntax());
            }
        }
        if self.check_keyword("def") {
            self.parse_function_def(decorators, Some(start), false)
        } else if self.check_keyword("class") {
            self.parse_class_def(decorators, Some(start))
        } else if self.check_keyword("async") && self.peek_nth(1).is_name("def") {
            self.advance();
            self.parse_function_def(decorators, Some(start), true)
        } else {
            Err(self.invalid_syntax())
        }
    }

    fn parse_async(&mut self) -> PResult<Stmt> {
        let start = self.peek().start;
        self.expect_keyword("async")?;
        if self.check_keyword("def") {
            self.parse_function_def(Vec::new(), Some(start), true)
        } else if self.check_keyword("for") {
            self.parse_for(Some(start))
        } else if self.check_keyword("with") {
            self.parse_with(Some(start))
        } else {
            Err(self.invalid_syntax())
        }
    }

    fn parse_function_def(
        &mut self,
        decorators: Vec<Expr>,
        start: Option<Pos>,
        is_async: bool,
    ) -> PResult<Stmt> {
        let def_token = self.expect_keyword("def")?;
        let start = start.unwrap_or(def_token.start);
        let (name, _) = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parse_parameters(")", true)?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") { Some(self.parse_expression()?) } else { None };
        let body = self.parse_block("def", def_token.start.line)?;
        let def = FunctionDef { name, params, body, decorators, returns, is_async };
        Ok(Stmt::new(StmtKind::FunctionDef(def), self.span_from(start)))
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>, start: Option<Pos>) -> PResult<Stmt> {
        let class_token = self.expect_keyword("class")?;
        let start = start.unwrap_or(class_token.start);
        let (name, _) = self.expect_name()?;
        let (bases, keywords) = if self.eat_op("(") {
            let call = self.parse_call_arguments()?;
            self.expect_op(")")?;
            call
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block("class", class_token.start.line)?;
        let def = ClassDef { name, bases, keywords, body, decorators };
        Ok(Stmt::new(StmtKind::ClassDef(def), self.span_from(start)))
    }

    /// Parameter list up to (not including) `close`
    fn parse_parameters(&mut self, close: &str, allow_annotations: bool) -> PResult<Parameters> {
        let mut params: Vec<Parameter> = Vec::new();
        let mut seen_star = false;
        let mut seen_default = false;

        while !self.check_op(close) {
            let start = self.peek().start;
            if self.eat_op("/") {
                for param in params.iter_mut() {
                    if param.kind == ParamKind::Regular {
                        param.kind = ParamKind::PositionalOnly;
                    }
                }
            } else if self.eat_op("**") {
                let (name, _) = self.expect_name()?;
                let annotation = self.parse_param_annotation(allow_annotations)?;
                params.push(Parameter {
                    name,
                    kind: ParamKind::KwArgs,
                    annotation,
                    default: None,
                    span: self.span_from(start),
                });
            } else if self.eat_op("*") {
                seen_star = true;
                if self.is_name_token() {
                    let (name, _) = self.expect_name()?;
                    let annotation = self.parse_param_annotation(allow_annotations)?;
                    params.push(Parameter {
                        name,
                        kind: ParamKind::VarArgs,
                        annotation,
                        default: None,
                        span: self.span_from(start),
                    });
                }
            } else {
                let (name, _) = self.expect_name()?;
                let annotation = self.parse_param_annotation(allow_annotations)?;
                let default = if self.eat_op("=") { Some(self.parse_expression()?) } else { None };
                let kind = if seen_star { ParamKind::KeywordOnly } else { ParamKind::Regular };
                if default.is_some() {
                    seen_default = true;
                } else if seen_default && kind == ParamKind::Regular {
                    return Err(SyntaxError::new(
                        "non-default argument follows default argument",
                        start.line,
                        start.column,
                    ));
                }
                if params.iter().any(|p| p.name == name) {
                    return Err(SyntaxError::new(
                        &format!("duplicate argument '{}' in function definition", name),
                        start.line,
                        start.column,
                    ));
                }
                params.push(Parameter { name, kind, annotation, default, span: self.span_from(start) });
            }

            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Parameters { params })
    }

    fn parse_param_annotation(&mut self, allowed: bool) -> PResult<Option<Expr>> {
        if allowed && self.eat_op(":") {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let keyword = if token.is_name("elif") { "elif" } else { "if" };
        let test = self.parse_named_expression()?;
        let body = self.parse_block(keyword, token.start.line)?;
        let orelse = if self.check_keyword("elif") {
            vec![self.parse_if()?]
        } else if self.check_keyword("else") {
            let else_token = self.advance();
            self.parse_block("else", else_token.start.line)?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, self.span_from(token.start)))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let token = self.expect_keyword("while")?;
        let test = self.parse_named_expression()?;
        let body = self.parse_block("while", token.start.line)?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(StmtKind::While { test, body, orelse }, self.span_from(token.start)))
    }

    fn parse_else_block(&mut self) -> PResult<Vec<Stmt>> {
        if self.check_keyword("else") {
            let token = self.advance();
            self.parse_block("else", token.start.line)
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_for(&mut self, start: Option<Pos>) -> PResult<Stmt> {
        let token = self.expect_keyword("for")?;
        let is_async = start.is_some();
        let start = start.unwrap_or(token.start);
        let target = self.parse_target_list()?;
        self.expect_keyword("in")?;
        let iter = self.parse_star_expressions()?;
        let body = self.parse_block("for", token.start.line)?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::For { target, iter, body, orelse, is_async },
            self.span_from(start),
        ))
    }

    /// `for` and comprehension targets: one or more star-targets, tuple if comma-separated
    fn parse_target_list(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let mut targets = vec![self.parse_star_target()?];
        let mut trailing_comma = false;
        while self.eat_op(",") {
            trailing_comma = true;
            if self.check_keyword("in") {
                break;
            }
            trailing_comma = false;
            targets.push(self.parse_star_target()?);
        }
        let expr = if targets.len() == 1 && !trailing_comma {
            targets.remove(0)
        } else {
            Expr::new(ExprKind::Tuple { elts: targets, ctx: ExprContext::Load }, self.span_from(start))
        };
        with_context(expr, ExprContext::Store)
    }

    fn parse_star_target(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        if self.eat_op("*") {
            let value = self.parse_bitwise_or()?;
            return Ok(Expr::new(
                ExprKind::Starred { value: Box::new(value), ctx: ExprContext::Load },
                self.span_from(start),
            ));
        }
        self.parse_bitwise_or()
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let token = self.expect_keyword("try")?;
        let body = self.parse_block("try", token.start.line)?;
        let mut handlers = Vec::new();
        let mut is_star = false;
        while self.check_keyword("except") {
            let except = self.advance();
            if self.eat_op("*") {
                is_star = true;
            }
            let mut type_ = None;
            let mut name = None;
            if !self.check_op(":") {
                type_ = Some(self.parse_expression_list()?);
                if self.eat_keyword("as") {
                    name = Some(self.expect_name()?.0);
                }
            }
            let handler_body = self.parse_block("except", except.start.line)?;
            handlers.push(ExceptHandler {
                type_,
                name,
                body: handler_body,
                span: self.span_from(except.start),
            });
        }
        let orelse = self.parse_else_block()?;
        let finalbody = if self.check_keyword("finally") {
            let finally = self.advance();
            self.parse_block("finally", finally.start.line)?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::new(
            StmtKind::Try { body, handlers, orelse, finalbody, is_star },
            self.span_from(token.start),
        ))
    }

    /// Comma-separated expressions folded into a tuple (used by `except A, B` forms)
    fn parse_expression_list(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op(":") || self.check_keyword("as") {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn parse_with(&mut self, start: Option<Pos>) -> PResult<Stmt> {
        let token = self.expect_keyword("with")?;
        let is_async = start.is_some();
        let start = start.unwrap_or(token.start);

        let items = match self.try_parse_parenthesized_with_items()? {
            Some(items) => items,
            None => {
                let mut items = vec![self.parse_with_item()?];
                while self.eat_op(",") {
                    items.push(self.parse_with_item()?);
                }
                items
            }
        };
        let body = self.parse_block("with", token.start.line)?;
        Ok(Stmt::new(StmtKind::With { items, body, is_async }, self.span_from(start)))
    }

    fn try_parse_parenthesized_with_items(&mut self) -> PResult<Option<Vec<WithItem>>> {
        if !self.check_op("(") {
            return Ok(None);
        }
        let saved = (self.pos, self.prev_end);
        self.advance();
        let attempt = (|| -> PResult<Vec<WithItem>> {
            let mut items = Vec::new();
            while !self.check_op(")") {
                items.push(self.parse_with_item()?);
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
            if !self.check_op(":") {
                return Err(self.invalid_syntax());
            }
            Ok(items)
        })();
        match attempt {
            Ok(items) if !items.is_empty() => Ok(Some(items)),
            _ => {
                self.pos = saved.0;
                self.prev_end = saved.1;
                Ok(None)
            }
        }
    }

    fn parse_with_item(&mut self) -> PResult<WithItem> {
        let context_expr = self.parse_expression()?;
        let optional_vars = if self.eat_keyword("as") {
            Some(with_context(self.parse_star_target()?, ExprContext::Store)?)
        } else {
            None
        };
        Ok(WithItem { context_expr, optional_vars })
    }

    // ----- match statement ----------------------------------------------

    /// `match` is a soft keyword: fall back to an expression statement when
    /// the line is not shaped like a match header.
    fn try_parse_match(&mut self) -> PResult<Option<Stmt>> {
        let saved = (self.pos, self.prev_end);
        let token = self.advance();
        let header = (|| -> PResult<Expr> {
            let subject = self.parse_star_named_expressions()?;
            self.expect_op(":")?;
            if !matches!(self.peek().kind, TokenKind::Newline) {
                return Err(self.invalid_syntax());
            }
            Ok(subject)
        })();
        let subject = match header {
            Ok(subject) => subject,
            Err(_) => {
                self.pos = saved.0;
                self.prev_end = saved.1;
                return Ok(None);
            }
        };

        self.advance();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(self.error_here(&format!(
                "expected an indented block after 'match' statement on line {}",
                token.start.line
            )));
        }
        self.advance();

        let mut cases = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.consume_dedent();
                    break;
                }
                TokenKind::EndMarker => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    if !self.check_keyword("case") {
                        return Err(self.invalid_syntax());
                    }
                    cases.push(self.parse_case()?);
                }
            }
        }
        Ok(Some(Stmt::new(StmtKind::Match { subject, cases }, self.span_from(token.start))))
    }

    fn parse_star_named_expressions(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_star_named_expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op(":") {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn parse_case(&mut self) -> PResult<MatchCase> {
        let token = self.advance();
        let pattern = self.parse_open_pattern()?;
        let guard = if self.eat_keyword("if") { Some(self.parse_named_expression()?) } else { None };
        let body = self.parse_block("case", token.start.line)?;
        Ok(MatchCase { pattern, guard, body, span: self.span_from(token.start) })
    }

    /// Top-level case pattern; bare comma-separated patterns form a sequence
    fn parse_open_pattern(&mut self) -> PResult<Pattern> {
        let start = self.peek().start;
        let first = self.parse_as_pattern()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut patterns = vec![first];
        while self.eat_op(",") {
            if self.check_op(":") || self.check_keyword("if") {
                break;
            }
            patterns.push(self.parse_as_pattern()?);
        }
        Ok(Pattern { kind: PatternKind::Sequence(patterns), span: self.span_from(start) })
    }

    fn parse_as_pattern(&mut self) -> PResult<Pattern> {
        let start = self.peek().start;
        let pattern = self.parse_or_pattern()?;
        if self.eat_keyword("as") {
            let (name, _) = self.expect_name()?;
            return Ok(Pattern {
                kind: PatternKind::As { pattern: Some(Box::new(pattern)), name: Some(name) },
                span: self.span_from(start),
            });
        }
        Ok(pattern)
    }

    fn parse_or_pattern(&mut self) -> PResult<Pattern> {
        let start = self.peek().start;
        let first = self.parse_closed_pattern()?;
        if !self.check_op("|") {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while self.eat_op("|") {
            alternatives.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern { kind: PatternKind::Or(alternatives), span: self.span_from(start) })
    }

    fn parse_closed_pattern(&mut self) -> PResult<Pattern> {
        let start = self.peek().start;
        let token = self.peek().clone();
        let kind = match &token.kind {
            TokenKind::Op("*") => {
                self.advance();
                let (name, _) = self.expect_name()?;
                PatternKind::Star(if name == "_" { None } else { Some(name) })
            }
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    PatternKind::Sequence(Vec::new())
                } else {
                    let inner = self.parse_as_pattern()?;
                    if self.eat_op(")") {
                        return Ok(inner);
                    }
                    let mut patterns = vec![inner];
                    while self.eat_op(",") {
                        if self.check_op(")") {
                            break;
                        }
                        patterns.push(self.parse_as_pattern()?);
                    }
                    self.expect_op(")")?;
                    PatternKind::Sequence(patterns)
                }
            }
            TokenKind::Op("[") => {
                self.advance();
                let mut patterns = Vec::new();
                while !self.check_op("]") {
                    patterns.push(self.parse_as_pattern()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("]")?;
                PatternKind::Sequence(patterns)
            }
            TokenKind::Op("{") => self.parse_mapping_pattern()?,
            TokenKind::Name(name) if name == "None" => {
                self.advance();
                PatternKind::Singleton(Constant::None)
            }
            TokenKind::Name(name) if name == "True" || name == "False" => {
                self.advance();
                PatternKind::Singleton(Constant::Bool(name == "True"))
            }
            TokenKind::Name(name) if !is_keyword(name) => {
                let first = self.parse_name_expr()?;
                let mut value = first;
                while self.check_op(".") {
                    self.advance();
                    let (attr, _) = self.expect_name()?;
                    value = Expr::new(
                        ExprKind::Attribute { value: Box::new(value), attr, ctx: ExprContext::Load },
                        self.span_from(start),
                    );
                }
                if self.check_op("(") {
                    self.parse_class_pattern(value)?
                } else if let ExprKind::Name { id, .. } = &value.kind {
                    let name = if id == "_" { None } else { Some(id.clone()) };
                    PatternKind::As { pattern: None, name }
                } else {
                    PatternKind::Value(value)
                }
            }
            TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Op("-") => {
                PatternKind::Value(self.parse_literal_pattern_value()?)
            }
            _ => return Err(self.invalid_syntax()),
        };
        Ok(Pattern { kind, span: self.span_from(start) })
    }

    fn parse_literal_pattern_value(&mut self) -> PResult<Expr> {
        // literal patterns are a restricted sum: [-]number [(+|-) imaginary] or strings
        self.parse_sum()
    }

    fn parse_mapping_pattern(&mut self) -> PResult<PatternKind> {
        self.expect_op("{")?;
        let mut keys = Vec::new();
        let mut patterns = Vec::new();
        let mut rest = None;
        while !self.check_op("}") {
            if self.eat_op("**") {
                rest = Some(self.expect_name()?.0);
            } else {
                let key = self.parse_sum()?;
                self.expect_op(":")?;
                keys.push(key);
                patterns.push(self.parse_as_pattern()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(PatternKind::Mapping { keys, patterns, rest })
    }

    fn parse_class_pattern(&mut self, cls: Expr) -> PResult<PatternKind> {
        self.expect_op("(")?;
        let mut patterns = Vec::new();
        let mut kwd_attrs = Vec::new();
        let mut kwd_patterns = Vec::new();
        while !self.check_op(")") {
            if self.is_name_token() && self.peek_nth(1).is_op("=") {
                let (attr, _) = self.expect_name()?;
                self.advance();
                kwd_attrs.push(attr);
                kwd_patterns.push(self.parse_as_pattern()?);
            } else {
                patterns.push(self.parse_as_pattern()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(PatternKind::Class { cls, patterns, kwd_attrs, kwd_patterns })
    }

    // ----- expressions ---------------------------------------------------

    /// Comma-separated expressions, producing a tuple when a comma is present
    pub fn parse_star_expressions(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_star_expression()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.at_expression_list_end() {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn at_expression_list_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker)
            || ["=", ")", "]", "}", ";", ":"].iter().any(|op| self.check_op(op))
            || self.peek_augassign().is_some()
            || self.check_keyword("in")
    }

    fn parse_star_expression(&mut self) -> PResult<Expr> {
        if self.check_op("*") {
            let start = self.advance().start;
            let value = self.parse_bitwise_or()?;
            return Ok(Expr::new(
                ExprKind::Starred { value: Box::new(value), ctx: ExprContext::Load },
                self.span_from(start),
            ));
        }
        self.parse_named_expression()
    }

    fn parse_star_named_expression(&mut self) -> PResult<Expr> {
        self.parse_star_expression()
    }

    fn parse_named_expression(&mut self) -> PResult<Expr> {
        if self.is_name_token() && self.peek_nth(1).is_op(":=") {
            let start = self.peek().start;
            let target = self.parse_name_expr()?;
            self.advance();
            let value = self.parse_expression()?;
            let target = with_context(target, ExprContext::Store)?;
            return Ok(Expr::new(
                ExprKind::NamedExpr { target: Box::new(target), value: Box::new(value) },
                self.span_from(start),
            ));
        }
        self.parse_expression()
    }

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        if self.check_keyword("lambda") {
            return self.parse_lambda();
        }
        let start = self.peek().start;
        let body = self.parse_disjunction()?;
        if self.check_keyword("if") {
            // a trailing `if` inside comprehensions belongs to the comprehension
            let saved = (self.pos, self.prev_end);
            self.advance();
            let test = self.parse_disjunction()?;
            if !self.eat_keyword("else") {
                self.pos = saved.0;
                self.prev_end = saved.1;
                return Err(self.error_here("expected 'else' after 'if' expression"));
            }
            let orelse = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                self.span_from(start),
            ));
        }
        Ok(body)
    }

    /// Expression that may not contain a conditional (`a if b else c`); used
    /// where a following `if` belongs to an enclosing comprehension.
    fn parse_expression_no_cond(&mut self) -> PResult<Expr> {
        if self.check_keyword("lambda") {
            return self.parse_lambda();
        }
        self.parse_disjunction()
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let start = self.expect_keyword("lambda")?.start;
        let params = self.parse_parameters(":", false)?;
        self.expect_op(":")?;
        let body = self.parse_expression()?;
        Ok(Expr::new(
            ExprKind::Lambda { params: Box::new(params), body: Box::new(body) },
            self.span_from(start),
        ))
    }

    fn parse_disjunction(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_conjunction()?;
        if !self.check_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.parse_conjunction()?);
        }
        Ok(Expr::new(ExprKind::BoolOp { op: BoolOp::Or, values }, self.span_from(start)))
    }

    fn parse_conjunction(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_inversion()?;
        if !self.check_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.parse_inversion()?);
        }
        Ok(Expr::new(ExprKind::BoolOp { op: BoolOp::And, values }, self.span_from(start)))
    }

    fn parse_inversion(&mut self) -> PResult<Expr> {
        if self.check_keyword("not") {
            let start = self.advance().start;
            let operand = self.parse_inversion()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp { op: UnaryOp::Not, operand: Box::new(operand) },
                self.span_from(start),
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let left = self.parse_bitwise_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.peek_comparison_op() {
            comparators.push(self.parse_bitwise_or()?);
            ops.push(op);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare { left: Box::new(left), ops, comparators },
            self.span_from(start),
        ))
    }

    /// Consumes a comparison operator if one is next
    fn peek_comparison_op(&mut self) -> Option<CmpOp> {
        let token = self.peek().clone();
        let op = match &token.kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "not" && self.peek_nth(1).is_name("in") => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Name(n) if n == "is" => {
                if self.peek_nth(1).is_name("not") {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_binary_level(
        &mut self,
        table: &[(&str, Operator)],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let start = self.peek().start;
        let mut left = next(self)?;
        loop {
            let Some(op) = table.iter().find(|(sym, _)| self.check_op(sym)).map(|(_, op)| *op) else {
                break;
            };
            self.advance();
            let right = next(self)?;
            left = Expr::new(
                ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                self.span_from(start),
            );
        }
        Ok(left)
    }

    fn parse_bitwise_or(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&[("|", Operator::BitOr)], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&[("^", Operator::BitXor)], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&[("&", Operator::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            &[("<<", Operator::LShift), (">>", Operator::RShift)],
            Self::parse_sum,
        )
    }

    fn parse_sum(&mut self) -> PResult<Expr> {
        self.parse_binary_level(&[("+", Operator::Add), ("-", Operator::Sub)], Self::parse_term)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        self.parse_binary_level(
            &[
                ("*", Operator::Mult),
                ("/", Operator::Div),
                ("//", Operator::FloorDiv),
                ("%", Operator::Mod),
                ("@", Operator::MatMult),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let op = if self.check_op("+") {
            Some(UnaryOp::UAdd)
        } else if self.check_op("-") {
            Some(UnaryOp::USub)
        } else if self.check_op("~") {
            Some(UnaryOp::Invert)
        } else {
            None
        };
        if let Some(op) = op {
            let start = self.advance().start;
            let operand = self.parse_factor()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp { op, operand: Box::new(operand) },
                self.span_from(start),
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let base = self.parse_await_primary()?;
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(Expr::new(
                ExprKind::BinOp { left: Box::new(base), op: Operator::Pow, right: Box::new(exponent) },
                self.span_from(start),
            ));
        }
        Ok(base)
    }

    fn parse_await_primary(&mut self) -> PResult<Expr> {
        if self.check_keyword("await") {
            let start = self.advance().start;
            let value = self.parse_primary()?;
            return Ok(Expr::new(ExprKind::Await(Box::new(value)), self.span_from(start)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let mut expr = self.parse_atom()?;
        loop {
            if self.check_op(".") {
                self.advance();
                let (attr, _) = self.expect_name()?;
                expr = Expr::new(
                    ExprKind::Attribute { value: Box::new(expr), attr, ctx: ExprContext::Load },
                    self.span_from(start),
                );
            } else if self.check_op("(") {
                self.advance();
                let (args, keywords) = self.parse_call_arguments()?;
                self.expect_op(")")?;
                expr = Expr::new(
                    ExprKind::Call { func: Box::new(expr), args, keywords },
                    self.span_from(start),
                );
            } else if self.check_op("[") {
                self.advance();
                let slice = self.parse_slices()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        slice: Box::new(slice),
                        ctx: ExprContext::Load,
                    },
                    self.span_from(start),
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check_op(")") {
            let start = self.peek().start;
            if self.eat_op("**") {
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg: None, value, span: self.span_from(start) });
            } else if self.check_op("*") {
                args.push(self.parse_star_expression()?);
            } else if self.is_name_token() && self.peek_nth(1).is_op("=") {
                let (name, _) = self.expect_name()?;
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg: Some(name), value, span: self.span_from(start) });
            } else {
                let arg = self.parse_named_expression()?;
                if self.check_keyword("for") || self.check_keyword("async") {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::new(
                        ExprKind::GeneratorExp { elt: Box::new(arg), generators },
                        self.span_from(start),
                    ));
                } else {
                    if !keywords.is_empty() && !matches!(arg.kind, ExprKind::Starred { .. }) {
                        return Err(SyntaxError::new(
                            "positional argument follows keyword argument",
                            arg.span.line,
                            arg.span.column,
                        ));
                    }
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_slices(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let first = self.parse_slice()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.parse_slice()?);
        }
        Ok(Expr::new(ExprKind::Tuple { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn parse_slice(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let lower = if self.check_op(":") { None } else { Some(self.parse_star_expression()?) };
        if !self.check_op(":") {
            return lower.ok_or_else(|| self.invalid_syntax());
        }
        self.advance();
        let upper = if self.check_op(":") || self.check_op("]") || self.check_op(",") {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat_op(":") {
            if self.check_op("]") || self.check_op(",") {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            }
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice { lower: lower.map(Box::new), upper, step },
            self.span_from(start),
        ))
    }

    fn parse_name_expr(&mut self) -> PResult<Expr> {
        let (id, token) = self.expect_name()?;
        Ok(Expr::new(ExprKind::Name { id, ctx: ExprContext::Load }, self.span_from(token.start)))
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let start = token.start;
        match &token.kind {
            TokenKind::Name(name) => match name.as_str() {
                "None" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Constant(Constant::None), self.span_from(start)))
                }
                "True" | "False" => {
                    self.advance();
                    Ok(Expr::new(
                        ExprKind::Constant(Constant::Bool(name == "True")),
                        self.span_from(start),
                    ))
                }
                "yield" => Err(self.error_here("'yield' outside parenthesized expression")),
                n if is_keyword(n) => Err(self.invalid_syntax()),
                _ => self.parse_name_expr(),
            },
            TokenKind::Number(text) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(number_constant(text)), self.span_from(start)))
            }
            TokenKind::Str(_) => self.parse_strings(),
            TokenKind::Op("...") => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Ellipsis), self.span_from(start)))
            }
            TokenKind::Op("(") => self.parse_paren(),
            TokenKind::Op("[") => self.parse_list(),
            TokenKind::Op("{") => self.parse_brace(),
            TokenKind::Indent => Err(self.error_here("unexpected indent")),
            TokenKind::Newline | TokenKind::EndMarker => Err(self.invalid_syntax()),
            _ => Err(self.invalid_syntax()),
        }
    }

    /// Adjacent string literals concatenate; any f-string part makes the whole an f-string
    fn parse_strings(&mut self) -> PResult<Expr> {
        let start = self.peek().start;
        let mut literal = String::new();
        let mut values = Vec::new();
        let mut formatted = false;
        let mut bytes = false;
        while let TokenKind::Str(StrLiteral { value, kind, fields }) = self.peek().kind.clone() {
            self.advance();
            literal.push_str(&value);
            match kind {
                StrKind::Format => {
                    formatted = true;
                    for field in fields {
                        values.push(parse_fragment(&field.text, field.pos)?);
                    }
                }
                StrKind::Bytes => bytes = true,
                StrKind::Plain => {}
            }
        }
        let kind = if formatted {
            ExprKind::FormattedString { literal, values }
        } else if bytes {
            ExprKind::Constant(Constant::Bytes(literal))
        } else {
            ExprKind::Constant(Constant::Str(literal))
        };
        Ok(Expr::new(kind, self.span_from(start)))
    }

    fn parse_paren(&mut self) -> PResult<Expr> {
        let start = self.expect_op("(")?.start;
        if self.eat_op(")") {
            return Ok(Expr::new(
                ExprKind::Tuple { elts: Vec::new(), ctx: ExprContext::Load },
                self.span_from(start),
            ));
        }
        if self.check_keyword("yield") {
            let expr = self.parse_yield()?;
            self.expect_op(")")?;
            return Ok(expr);
        }

        let first = self.parse_star_named_expression()?;
        if self.check_keyword("for") || self.check_keyword("async") {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::new(
                ExprKind::GeneratorExp { elt: Box::new(first), generators },
                self.span_from(start),
            ));
        }
        if self.eat_op(")") {
            // parenthesized expression keeps its inner node but widens the span
            let mut inner = first;
            inner.span = self.span_from(start);
            return Ok(inner);
        }

        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op(")") {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect_op(")")?;
        Ok(Expr::new(ExprKind::Tuple { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn parse_list(&mut self) -> PResult<Expr> {
        let start = self.expect_op("[")?.start;
        if self.eat_op("]") {
            return Ok(Expr::new(
                ExprKind::List { elts: Vec::new(), ctx: ExprContext::Load },
                self.span_from(start),
            ));
        }
        let first = self.parse_star_named_expression()?;
        if self.check_keyword("for") || self.check_keyword("async") {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::new(
                ExprKind::ListComp { elt: Box::new(first), generators },
                self.span_from(start),
            ));
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::new(ExprKind::List { elts, ctx: ExprContext::Load }, self.span_from(start)))
    }

    fn parse_brace(&mut self) -> PResult<Expr> {
        let start = self.expect_op("{")?.start;
        if self.eat_op("}") {
            return Ok(Expr::new(
                ExprKind::Dict { keys: Vec::new(), values: Vec::new() },
                self.span_from(start),
            ));
        }

        if self.eat_op("**") {
            let value = self.parse_bitwise_or()?;
            return self.finish_dict(start, None, value);
        }

        let first = self.parse_star_named_expression()?;
        if self.eat_op(":") {
            let value = self.parse_expression()?;
            if self.check_keyword("for") || self.check_keyword("async") {
                let generators = self.parse_comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::new(
                    ExprKind::DictComp { key: Box::new(first), value: Box::new(value), generators },
                    self.span_from(start),
                ));
            }
            return self.finish_dict(start, Some(first), value);
        }

        if self.check_keyword("for") || self.check_keyword("async") {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::new(
                ExprKind::SetComp { elt: Box::new(first), generators },
                self.span_from(start),
            ));
        }

        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expr::new(ExprKind::Set(elts), self.span_from(start)))
    }

    fn finish_dict(&mut self, start: Pos, first_key: Option<Expr>, first_value: Expr) -> PResult<Expr> {
        let mut keys = vec![first_key];
        let mut values = vec![first_value];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            if self.eat_op("**") {
                keys.push(None);
                values.push(self.parse_bitwise_or()?);
            } else {
                keys.push(Some(self.parse_expression()?));
                self.expect_op(":")?;
                values.push(self.parse_expression()?);
            }
        }
        self.expect_op("}")?;
        Ok(Expr::new(ExprKind::Dict { keys, values }, self.span_from(start)))
    }

    fn parse_comprehension_clauses(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = self.eat_keyword("async");
            if !self.eat_keyword("for") {
                if is_async {
                    return Err(self.invalid_syntax());
                }
                break;
            }
            let target = self.parse_target_list()?;
            self.expect_keyword("in")?;
            let iter = self.parse_disjunction()?;
            let mut ifs = Vec::new();
            while self.eat_keyword("if") {
                ifs.push(self.parse_expression_no_cond()?);
            }
            generators.push(Comprehension { target, iter, ifs, is_async });
        }
        Ok(generators)
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        let start = self.expect_keyword("yield")?.start;
        if self.eat_keyword("from") {
            let value = self.parse_expression()?;
            return Ok(Expr::new(ExprKind::YieldFrom(Box::new(value)), self.span_from(start)));
        }
        let value = if self.at_statement_end() || self.check_op(")") || self.check_op("=") {
            None
        } else {
            Some(Box::new(self.parse_star_expressions()?))
        };
        Ok(Expr::new(ExprKind::Yield(value), self.span_from(start)))
    }
}

/// Parses an f-string replacement field located at `origin`
fn parse_fragment(text: &str, origin: Pos) -> PResult<Expr> {
    let tokens = Lexer::for_fragment(text, origin).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_star_expressions()?;
    if !parser.at_end() {
        return Err(parser.error_here("f-string: invalid syntax"));
    }
    Ok(expr)
}

fn number_constant(text: &str) -> Constant {
    let lower = text.to_ascii_lowercase();
    if lower.ends_with('j') {
        Constant::Complex(text.to_string())
    } else if lower.starts_with("0x") || lower.starts_with("0o") || lower.starts_with("0b") {
        Constant::Int(text.to_string())
    } else if lower.contains('.') || lower.contains('e') {
        Constant::Float(lower.parse().unwrap_or(0.0))
    } else {
        Constant::Int(text.to_string())
    }
}

fn single_target(expr: Expr) -> PResult<Expr> {
    with_context(expr, ExprContext::Store)
}

/// Marks an expression as an assignment/deletion target, rejecting invalid ones
fn with_context(expr: Expr, ctx: ExprContext) -> PResult<Expr> {
    let span = expr.span;
    let kind = match expr.kind {
        ExprKind::Name { id, .. } => ExprKind::Name { id, ctx },
        ExprKind::Attribute { value, attr, .. } => ExprKind::Attribute { value, attr, ctx },
        ExprKind::Subscript { value, slice, .. } => ExprKind::Subscript { value, slice, ctx },
        ExprKind::Starred { value, .. } => {
            ExprKind::Starred { value: Box::new(with_context(*value, ctx)?), ctx }
        }
        ExprKind::Tuple { elts, .. } => ExprKind::Tuple {
            elts: elts.into_iter().map(|e| with_context(e, ctx)).collect::<PResult<_>>()?,
            ctx,
        },
        ExprKind::List { elts, .. } => ExprKind::List {
            elts: elts.into_iter().map(|e| with_context(e, ctx)).collect::<PResult<_>>()?,
            ctx,
        },
        other => {
            let what = match other {
                ExprKind::Call { .. } => "function call",
                ExprKind::Constant(_) | ExprKind::FormattedString { .. } => "literal",
                ExprKind::BinOp { .. } | ExprKind::UnaryOp { .. } | ExprKind::BoolOp { .. } => {
                    "expression"
                }
                ExprKind::Compare { .. } => "comparison",
                ExprKind::Lambda { .. } => "lambda",
                ExprKind::IfExp { .. } => "conditional expression",
                ExprKind::Await(_) => "await expression",
                _ => "expression",
            };
            let verb = if ctx == ExprContext::Del { "delete" } else { "assign to" };
            let mut message = format!("cannot {} {}", verb, what);
            if what != "expression" && ctx == ExprContext::Store {
                message.push_str(" here. Maybe you meant '==' instead of '='?");
            }
            return Err(SyntaxError::new(&message, span.line, span.column));
        }
    };
    Ok(Expr::new(kind, span))
}

#[cfg(test)]
mod tests {
    use super::super::{parse_module, ParseMode, parse};

    fn ok(source: &str) {
        if let Err(err) = parse_module(source) {
            panic!("failed to parse {:?}: {}", source, err);
        }
    }

    #[test]
    fn test_parse_function_with_annotations_should_succeed() {
        ok("def add(a: int, b: int = 0, *args, key=None, **kwargs) -> int:\n    return a + b\n");
    }

    #[test]
    fn test_parse_class_with_decorated_methods_should_succeed() {
        ok("@dataclass\nclass Point(Base, metaclass=Meta):\n    x: int = 0\n\n    @property\n    def norm(self):\n        return (self.x ** 2) ** 0.5\n");
    }

    #[test]
    fn test_parse_comprehensions_should_succeed() {
        ok("a = [x * 2 for x in range(10) if x % 2 == 0]\nb = {k: v for k, v in d.items()}\nc = {x for x in s}\nd = sum(x for x in y)\n");
    }

    #[test]
    fn test_parse_control_flow_should_succeed() {
        ok("for i, v in enumerate(xs):\n    if v:\n        continue\n    elif i > 3:\n        break\n    else:\n        pass\nelse:\n    print('done')\nwhile n := next(it, None):\n    pass\n");
    }

    #[test]
    fn test_parse_try_with_should_succeed() {
        ok("try:\n    with open(p) as f, lock:\n        data = f.read()\nexcept (IOError, ValueError) as e:\n    raise RuntimeError('x') from e\nelse:\n    pass\nfinally:\n    cleanup()\n");
    }

    #[test]
    fn test_parse_match_statement_should_succeed() {
        ok("match command.split():\n    case [\"go\", direction]:\n        move(direction)\n    case Point(x=0, y=0) | None:\n        pass\n    case {\"k\": v, **rest}:\n        pass\n    case _:\n        pass\n");
    }

    #[test]
    fn test_parse_match_as_identifier_should_fall_back_to_expression() {
        ok("match = re.match(p, s)\nmatch(x)\n");
    }

    #[test]
    fn test_parse_lambda_and_conditional_should_succeed() {
        ok("f = lambda x, y=1: x if x > y else y\nvalue = a[1:2, ::3]\nprint(*args, sep='')\n");
    }

    #[test]
    fn test_parse_fstring_fields_should_parse_expressions() {
        let module = parse_module("name = 'x'\nprint(f\"hi {name.upper()}\")\n").unwrap();
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn test_parse_missing_colon_should_report_expected_colon() {
        let err = parse_module("def f()\n    return 1\n").unwrap_err();
        assert_eq!(err.message, "expected ':'");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_parse_missing_body_should_report_indented_block() {
        let err = parse_module("if x:\nprint(1)\n").unwrap_err();
        assert!(err.message.starts_with("expected an indented block after 'if'"));
    }

    #[test]
    fn test_parse_assign_to_call_should_fail() {
        let err = parse_module("f() = 3\n").unwrap_err();
        assert!(err.message.starts_with("cannot assign to function call"));
    }

    #[test]
    fn test_parse_unexpected_indent_should_fail() {
        let err = parse_module("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.message, "unexpected indent");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_parse_eval_mode_should_wrap_expression() {
        let module = parse("a + b", ParseMode::Eval).unwrap();
        assert_eq!(module.body.len(), 1);
    }

    #[test]
    fn test_parse_spans_should_cover_decorators() {
        let source = "@cache\ndef f():\n    return 1\n";
        let module = parse_module(source).unwrap();
        let span = module.body[0].span;
        assert_eq!(span.line, 1);
        assert_eq!(span.slice(source).unwrap().trim_end(), source.trim_end());
    }
}
