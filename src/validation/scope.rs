/*!
 * Lexical scope analysis for undefined-name detection.
 *
 * Scopes form a tree mirroring the program's nesting. Module, function,
 * class, lambda and comprehension scopes own ordinary bindings; loop,
 * exception-handler, `with` and match-arm scopes only hold the names bound
 * by their construct, so those names never leak into the parent.
 *
 * Inside a scope a definition is visible from its line onward. Once a
 * lookup crosses a function or lambda boundary it becomes order-free,
 * since the body runs later; this is also what lets a method refer to a
 * sibling defined further down the class. Function and lambda bodies are
 * queued and only walked after the whole module has been bound, so a body
 * sees every name its enclosing code defines, wherever it appears.
 */

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::python::ast::{
    ClassDef, Comprehension, Expr, ExprContext, ExprKind, FunctionDef, Module, Parameters,
    Pattern, PatternKind, Span, Stmt, StmtKind,
};

static BUILTINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // functions
        "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
        "bytes", "callable", "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir",
        "divmod", "enumerate", "eval", "exec", "filter", "float", "format", "frozenset",
        "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
        "isinstance", "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview",
        "min", "next", "object", "oct", "open", "ord", "pow", "print", "property", "range",
        "repr", "reversed", "round", "set", "setattr", "slice", "sorted", "staticmethod", "str",
        "sum", "super", "tuple", "type", "vars", "zip", "__import__", "__build_class__",
        // constants
        "True", "False", "None", "Ellipsis", "NotImplemented", "__debug__", "exit", "quit",
        "copyright", "credits", "license",
        // exceptions
        "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup", "ArithmeticError",
        "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError", "BufferError",
        "ChildProcessError", "ConnectionAbortedError", "ConnectionError",
        "ConnectionRefusedError", "ConnectionResetError", "EOFError", "EnvironmentError",
        "FileExistsError", "FileNotFoundError", "FloatingPointError", "GeneratorExit", "IOError",
        "ImportError", "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError",
        "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError",
        "NameError", "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
        "PermissionError", "ProcessLookupError", "RecursionError", "ReferenceError",
        "RuntimeError", "StopAsyncIteration", "StopIteration", "SyntaxError", "SystemError",
        "SystemExit", "TabError", "TimeoutError", "TypeError", "UnboundLocalError",
        "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError",
        "ValueError", "ZeroDivisionError", "Warning", "UserWarning", "DeprecationWarning",
        "PendingDeprecationWarning", "SyntaxWarning", "RuntimeWarning", "FutureWarning",
        "ImportWarning", "UnicodeWarning", "BytesWarning", "ResourceWarning", "EncodingWarning",
        // module attributes and implicit names
        "self", "cls", "__name__", "__file__", "__doc__", "__package__", "__loader__", "__spec__",
        "__annotations__", "__cached__", "__builtins__", "__dict__", "__class__",
        // typing names generated code often uses without importing
        "Union", "Optional", "List", "Dict", "Tuple", "Set", "FrozenSet", "Type", "Callable",
        "Any", "TypeVar", "Generic", "Protocol", "Literal", "Final", "TypedDict", "NotRequired",
        "Required", "Annotated", "TypeAlias", "ParamSpec", "TypeVarTuple", "Unpack", "Self",
        "Never", "assert_type", "assert_never", "reveal_type",
    ]
    .into_iter()
    .collect()
});

/// Names offered as "did you mean" candidates besides those in scope
const COMMON_NAMES: &[&str] =
    &["print", "len", "range", "str", "int", "float", "list", "dict", "open", "input"];

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Class,
    Lambda,
    Comprehension,
    Loop,
    Handler,
    With,
    MatchArm,
}

impl ScopeKind {
    /// Scopes that receive ordinary assignments made inside them
    fn owns_bindings(self) -> bool {
        matches!(
            self,
            ScopeKind::Module | ScopeKind::Function | ScopeKind::Class | ScopeKind::Lambda | ScopeKind::Comprehension
        )
    }

    /// Bodies that run after the enclosing code, so outer lookups ignore order
    fn is_deferred(self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::Lambda)
    }
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    /// Name to first defining line
    pub defined: HashMap<String, usize>,
    pub used: HashSet<String>,
    pub params: HashSet<String>,
    pub globals: HashSet<String>,
    pub nonlocals: HashSet<String>,
}

impl Scope {
    fn new(kind: ScopeKind, name: &str, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            parent,
            defined: HashMap::new(),
            used: HashSet::new(),
            params: HashSet::new(),
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeIssue {
    Undefined { name: String, line: usize, column: usize, hint: Option<String> },
    MissingNonlocal { name: String, line: usize },
}

impl ScopeIssue {
    pub fn line(&self) -> usize {
        match self {
            ScopeIssue::Undefined { line, .. } | ScopeIssue::MissingNonlocal { line, .. } => *line,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ScopeIssue::Undefined { name, .. } | ScopeIssue::MissingNonlocal { name, .. } => name,
        }
    }
}

impl fmt::Display for ScopeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeIssue::Undefined { name, hint: Some(hint), .. } => {
                write!(f, "Undefined name '{}' (did you mean '{}'?)", name, hint)
            }
            ScopeIssue::Undefined { name, .. } => write!(f, "Undefined name '{}'", name),
            ScopeIssue::MissingNonlocal { name, .. } => {
                write!(f, "No binding for nonlocal '{}' found", name)
            }
        }
    }
}

/// A local variable assigned in a function but never read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedName {
    pub name: String,
    pub function: String,
    pub line: usize,
}

#[derive(Debug, Default)]
pub struct ScopeReport {
    pub issues: Vec<ScopeIssue>,
    pub unused: Vec<UnusedName>,
}

/// A function or lambda body whose walk waits for its enclosing code
enum DeferredBody<'a> {
    Stmts(&'a [Stmt]),
    Expr(&'a Expr),
}

enum Resolution {
    Builtin,
    Found(ScopeId),
    Unresolved,
}

/// Runs scope analysis over a parsed module
pub fn analyze(module: &Module) -> ScopeReport {
    let mut analyzer = ScopeAnalyzer::new();
    analyzer.module(module);
    analyzer.finish()
}

pub struct ScopeAnalyzer<'a> {
    scopes: Vec<Scope>,
    pending: VecDeque<(ScopeId, DeferredBody<'a>)>,
    current: ScopeId,
    in_annotation: bool,
    star_import: bool,
    issues: Vec<ScopeIssue>,
}

impl Default for ScopeAnalyzer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ScopeAnalyzer<'a> {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Module, "<module>", None)],
            pending: VecDeque::new(),
            current: 0,
            in_annotation: false,
            star_import: false,
            issues: Vec::new(),
        }
    }

    pub fn module(&mut self, module: &'a Module) {
        // module-level imports are visible everywhere
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::Import(aliases) => {
                    for alias in aliases {
                        self.define(0, alias.bound_name(), 0);
                    }
                }
                StmtKind::ImportFrom { names, .. } => {
                    for alias in names {
                        if alias.name == "*" {
                            self.star_import = true;
                        } else {
                            self.define(0, alias.bound_name(), 0);
                        }
                    }
                }
                _ => {}
            }
        }
        self.body(&module.body);
        self.drain();
    }

    /// Walks queued bodies once every name around them is bound
    fn drain(&mut self) {
        while let Some((scope, body)) = self.pending.pop_front() {
            let previous = std::mem::replace(&mut self.current, scope);
            match body {
                DeferredBody::Stmts(stmts) => self.body(stmts),
                DeferredBody::Expr(expr) => self.expr(expr),
            }
            self.current = previous;
        }
    }

    pub fn finish(mut self) -> ScopeReport {
        self.issues.sort_by_key(|issue| issue.line());
        let mut unused = Vec::new();
        for scope in self.scopes.iter().filter(|s| s.kind == ScopeKind::Function) {
            for (name, line) in &scope.defined {
                if !scope.used.contains(name)
                    && !scope.params.contains(name)
                    && !scope.globals.contains(name)
                    && !scope.nonlocals.contains(name)
                    && !name.starts_with('_')
                {
                    unused.push(UnusedName { name: name.clone(), function: scope.name.clone(), line: *line });
                }
            }
        }
        unused.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.name.cmp(&b.name)));
        ScopeReport { issues: self.issues, unused }
    }

    fn body(&mut self, body: &'a [Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::FunctionDef(def) => self.function(def, line),
            StmtKind::ClassDef(def) => self.class(def, line),
            StmtKind::Return(value) => self.opt_expr(value.as_ref()),
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.expr(target);
                }
            }
            StmtKind::Assign { targets, value } => {
                self.expr(value);
                for target in targets {
                    self.expr(target);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(value);
                match target.as_name() {
                    Some(name) => {
                        self.reference(name, target.span);
                        self.store(name, line);
                    }
                    None => self.expr(target),
                }
            }
            StmtKind::AnnAssign { target, annotation, value } => {
                self.annotation(annotation);
                self.opt_expr(value.as_ref());
                self.expr(target);
            }
            StmtKind::For { target, iter, body, orelse, .. } => {
                self.expr(iter);
                let scope = self.push(ScopeKind::Loop, "for");
                self.bind_target(target, scope);
                self.body(body);
                self.body(orelse);
                self.pop();
            }
            StmtKind::While { test, body, orelse } | StmtKind::If { test, body, orelse } => {
                self.expr(test);
                self.body(body);
                self.body(orelse);
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    self.expr(&item.context_expr);
                }
                let scope = self.push(ScopeKind::With, "with");
                for item in items {
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars, scope);
                    }
                }
                self.body(body);
                self.pop();
            }
            StmtKind::Match { subject, cases } => {
                self.expr(subject);
                for case in cases {
                    let scope = self.push(ScopeKind::MatchArm, "case");
                    self.pattern(&case.pattern, scope);
                    self.opt_expr(case.guard.as_ref());
                    self.body(&case.body);
                    self.pop();
                }
            }
            StmtKind::Raise { exc, cause } => {
                self.opt_expr(exc.as_ref());
                self.opt_expr(cause.as_ref());
            }
            StmtKind::Try { body, handlers, orelse, finalbody, .. } => {
                self.body(body);
                for handler in handlers {
                    self.opt_expr(handler.type_.as_ref());
                    let scope = self.push(ScopeKind::Handler, "except");
                    if let Some(name) = &handler.name {
                        self.define(scope, name, handler.span.line);
                    }
                    self.body(&handler.body);
                    self.pop();
                }
                self.body(orelse);
                self.body(finalbody);
            }
            StmtKind::Assert { test, msg } => {
                self.expr(test);
                self.opt_expr(msg.as_ref());
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.store(alias.bound_name(), line);
                }
            }
            StmtKind::ImportFrom { names, .. } => {
                for alias in names {
                    if alias.name == "*" {
                        self.star_import = true;
                    } else {
                        self.store(alias.bound_name(), line);
                    }
                }
            }
            StmtKind::Global(names) => {
                let owner = self.binding_scope();
                self.scopes[owner].globals.extend(names.iter().cloned());
            }
            StmtKind::Nonlocal(names) => {
                let owner = self.binding_scope();
                for name in names {
                    self.scopes[owner].nonlocals.insert(name.clone());
                    if !self.enclosing_function_defines(owner, name) {
                        self.issues.push(ScopeIssue::MissingNonlocal { name: name.clone(), line });
                    }
                }
            }
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn function(&mut self, def: &'a FunctionDef, line: usize) {
        self.store(&def.name, line);
        for decorator in &def.decorators {
            self.expr(decorator);
        }
        self.parameter_defaults(&def.params);
        if let Some(returns) = &def.returns {
            self.annotation(returns);
        }
        let scope = self.push(ScopeKind::Function, &def.name);
        self.define_parameters(scope, &def.params, line);
        self.pending.push_back((scope, DeferredBody::Stmts(&def.body)));
        self.pop();
    }

    fn class(&mut self, def: &'a ClassDef, line: usize) {
        self.store(&def.name, line);
        for decorator in &def.decorators {
            self.expr(decorator);
        }
        for base in &def.bases {
            self.expr(base);
        }
        for keyword in &def.keywords {
            self.expr(&keyword.value);
        }
        self.push(ScopeKind::Class, &def.name);
        self.body(&def.body);
        self.pop();
    }

    /// Defaults and annotations are evaluated where the function is defined
    fn parameter_defaults(&mut self, params: &'a Parameters) {
        for param in &params.params {
            if let Some(default) = &param.default {
                self.expr(default);
            }
            if let Some(annotation) = &param.annotation {
                self.annotation(annotation);
            }
        }
    }

    fn define_parameters(&mut self, scope: ScopeId, params: &Parameters, line: usize) {
        for name in params.names() {
            self.define(scope, name, line);
            self.scopes[scope].params.insert(name.to_string());
        }
    }

    fn annotation(&mut self, expr: &'a Expr) {
        let previous = std::mem::replace(&mut self.in_annotation, true);
        self.expr(expr);
        self.in_annotation = previous;
    }

    fn opt_expr(&mut self, expr: Option<&'a Expr>) {
        if let Some(expr) = expr {
            self.expr(expr);
        }
    }

    fn exprs(&mut self, exprs: impl IntoIterator<Item = &'a Expr>) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Name { id, ctx } => match ctx {
                ExprContext::Load => self.reference(id, expr.span),
                ExprContext::Store => self.store(id, expr.span.line),
                ExprContext::Del => {}
            },
            ExprKind::NamedExpr { target, value } => {
                self.expr(value);
                if let Some(name) = target.as_name() {
                    let owner = self.walrus_scope();
                    self.define(owner, name, target.span.line);
                }
            }
            ExprKind::Lambda { params, body } => {
                self.parameter_defaults(params);
                let scope = self.push(ScopeKind::Lambda, "<lambda>");
                self.define_parameters(scope, params, expr.span.line);
                self.pending.push_back((scope, DeferredBody::Expr(&**body)));
                self.pop();
            }
            ExprKind::ListComp { elt, generators }
            | ExprKind::SetComp { elt, generators }
            | ExprKind::GeneratorExp { elt, generators } => self.comprehension(generators, &[&**elt]),
            ExprKind::DictComp { key, value, generators } => {
                self.comprehension(generators, &[&**key, &**value])
            }
            ExprKind::BoolOp { values, .. } => self.exprs(values),
            ExprKind::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::UnaryOp { operand, .. } => self.expr(operand),
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            ExprKind::Dict { keys, values } => {
                self.exprs(keys.iter().flatten());
                self.exprs(values);
            }
            ExprKind::Set(elts) => self.exprs(elts),
            ExprKind::Await(value) | ExprKind::YieldFrom(value) => self.expr(value),
            ExprKind::Yield(value) => self.opt_expr(value.as_deref()),
            ExprKind::Compare { left, comparators, .. } => {
                self.expr(left);
                self.exprs(comparators);
            }
            ExprKind::Call { func, args, keywords } => {
                self.expr(func);
                self.exprs(args);
                self.exprs(keywords.iter().map(|k| &k.value));
            }
            ExprKind::FormattedString { values, .. } => self.exprs(values),
            ExprKind::Constant(_) => {}
            ExprKind::Attribute { value, .. } | ExprKind::Starred { value, .. } => self.expr(value),
            ExprKind::Subscript { value, slice, .. } => {
                self.expr(value);
                self.expr(slice);
            }
            ExprKind::List { elts, .. } | ExprKind::Tuple { elts, .. } => self.exprs(elts),
            ExprKind::Slice { lower, upper, step } => {
                self.opt_expr(lower.as_deref());
                self.opt_expr(upper.as_deref());
                self.opt_expr(step.as_deref());
            }
        }
    }

    /// The first iterable runs in the enclosing scope, everything else inside
    fn comprehension(&mut self, generators: &'a [Comprehension], results: &[&'a Expr]) {
        if let Some(first) = generators.first() {
            self.expr(&first.iter);
        }
        let scope = self.push(ScopeKind::Comprehension, "<comprehension>");
        for (i, generator) in generators.iter().enumerate() {
            if i > 0 {
                self.expr(&generator.iter);
            }
            self.bind_target(&generator.target, scope);
            self.exprs(&generator.ifs);
        }
        for result in results {
            self.expr(result);
        }
        self.pop();
    }

    fn pattern(&mut self, pattern: &'a Pattern, scope: ScopeId) {
        let line = pattern.span.line;
        match &pattern.kind {
            PatternKind::Value(expr) => self.expr(expr),
            PatternKind::Singleton(_) => {}
            PatternKind::Sequence(items) | PatternKind::Or(items) => {
                for item in items {
                    self.pattern(item, scope);
                }
            }
            PatternKind::Mapping { keys, patterns, rest } => {
                self.exprs(keys);
                for item in patterns {
                    self.pattern(item, scope);
                }
                if let Some(rest) = rest {
                    self.define(scope, rest, line);
                }
            }
            PatternKind::Class { cls, patterns, kwd_patterns, .. } => {
                self.expr(cls);
                for item in patterns.iter().chain(kwd_patterns) {
                    self.pattern(item, scope);
                }
            }
            PatternKind::Star(name) => {
                if let Some(name) = name.as_deref().filter(|n| *n != "_") {
                    self.define(scope, name, line);
                }
            }
            PatternKind::As { pattern: inner, name } => {
                if let Some(inner) = inner {
                    self.pattern(inner, scope);
                }
                if let Some(name) = name.as_deref().filter(|n| *n != "_") {
                    self.define(scope, name, line);
                }
            }
        }
    }

    /// Binds names of a construct target directly into `scope`
    fn bind_target(&mut self, target: &'a Expr, scope: ScopeId) {
        match &target.kind {
            ExprKind::Name { id, .. } => self.define(scope, id, target.span.line),
            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                for elt in elts {
                    self.bind_target(elt, scope);
                }
            }
            ExprKind::Starred { value, .. } => self.bind_target(value, scope),
            _ => self.expr(target),
        }
    }

    fn reference(&mut self, name: &str, span: Span) {
        if self.in_annotation && name.starts_with(|c: char| c.is_uppercase()) {
            return;
        }
        match self.resolve(name, span.line) {
            Resolution::Builtin => {}
            Resolution::Found(scope) => {
                self.scopes[scope].used.insert(name.to_string());
            }
            Resolution::Unresolved if self.star_import => {}
            Resolution::Unresolved => {
                let hint = self.similar_name(name);
                self.issues.push(ScopeIssue::Undefined {
                    name: name.to_string(),
                    line: span.line,
                    column: span.column,
                    hint,
                });
            }
        }
    }

    fn resolve(&self, name: &str, line: usize) -> Resolution {
        let mut id = Some(self.current);
        let mut deferred = false;
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id];
            if scope.globals.contains(name) {
                return if self.scopes[0].defined.contains_key(name) {
                    Resolution::Found(0)
                } else {
                    Resolution::Unresolved
                };
            }
            if scope.nonlocals.contains(name) {
                return self
                    .enclosing_function_scope(scope_id, name)
                    .map(Resolution::Found)
                    .unwrap_or(Resolution::Unresolved);
            }
            if let Some(&defined_at) = scope.defined.get(name) {
                if deferred || defined_at <= line {
                    return Resolution::Found(scope_id);
                }
            }
            deferred |= scope.kind.is_deferred();
            id = scope.parent;
        }
        if BUILTINS.contains(name) {
            Resolution::Builtin
        } else {
            Resolution::Unresolved
        }
    }

    /// Closest defined name within edit distance 2
    fn similar_name(&self, name: &str) -> Option<String> {
        let mut candidates: Vec<&str> = COMMON_NAMES.to_vec();
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            candidates.extend(self.scopes[scope_id].defined.keys().map(String::as_str));
            id = self.scopes[scope_id].parent;
        }
        candidates
            .into_iter()
            .filter(|candidate| *candidate != name)
            .map(|candidate| (levenshtein_distance(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= 2 && *distance < name.chars().count())
            .min()
            .map(|(_, candidate)| candidate.to_string())
    }

    fn define(&mut self, scope: ScopeId, name: &str, line: usize) {
        let entry = self.scopes[scope].defined.entry(name.to_string()).or_insert(line);
        if line < *entry {
            *entry = line;
        }
    }

    /// Ordinary binding: goes to the innermost scope that owns bindings
    fn store(&mut self, name: &str, line: usize) {
        let owner = self.binding_scope();
        if self.scopes[owner].globals.contains(name) {
            self.define(0, name, line);
        } else if !self.scopes[owner].nonlocals.contains(name) {
            self.define(owner, name, line);
        }
    }

    fn binding_scope(&self) -> ScopeId {
        let mut id = self.current;
        while !self.scopes[id].kind.owns_bindings() {
            match self.scopes[id].parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
        id
    }

    /// `:=` inside a comprehension binds in the surrounding function or module
    fn walrus_scope(&self) -> ScopeId {
        let mut id = self.current;
        loop {
            let scope = &self.scopes[id];
            if scope.kind.owns_bindings() && scope.kind != ScopeKind::Comprehension {
                return id;
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return id,
            }
        }
    }

    fn enclosing_function_scope(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut id = self.scopes[from].parent;
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id];
            if scope.kind.is_deferred() && scope.defined.contains_key(name) {
                return Some(scope_id);
            }
            id = scope.parent;
        }
        None
    }

    fn enclosing_function_defines(&self, from: ScopeId, name: &str) -> bool {
        self.enclosing_function_scope(from, name).is_some()
    }

    fn push(&mut self, kind: ScopeKind, name: &str) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope::new(kind, name, Some(self.current)));
        self.current = id;
        id
    }

    fn pop(&mut self) {
        self.current = self.scopes[self.current].parent.unwrap_or(0);
    }
}

/// Levenshtein distance between two identifiers
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];
    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1).min(curr_row[j] + 1).min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    prev_row[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::parse_module;

    fn issues(source: &str) -> Vec<ScopeIssue> {
        analyze(&parse_module(source).unwrap()).issues
    }

    #[test]
    fn test_undefined_name_should_report_line() {
        let found = issues("x = 1\nprint(y)\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "y");
        assert_eq!(found[0].line(), 2);
    }

    #[test]
    fn test_use_before_definition_at_module_level_should_be_reported() {
        let found = issues("print(total)\ntotal = 3\n");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_function_body_should_see_later_module_definitions() {
        let source = "def main():\n    return helper()\n\ndef helper():\n    return 1\n\nmain()\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_method_and_lambda_should_see_functions_defined_after_them() {
        let source = "class Report:\n    def render(self):\n        return fmt(self)\n\nlabel = lambda v: fmt(v)\n\ndef fmt(value):\n    return str(value)\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_nested_function_should_see_later_outer_local() {
        let source = "def outer():\n    def inner():\n        return factor * 2\n    factor = 3\n    return inner()\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_function_body_should_still_report_missing_name() {
        let found = issues("def main():\n    return helpr()\n\ndef helper():\n    return 1\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "helpr");
        assert_eq!(found[0].line(), 2);
    }

    #[test]
    fn test_loop_target_should_not_leak_out_of_loop() {
        let source = "for item in range(3):\n    print(item)\nprint(item)\n";
        let found = issues(source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line(), 3);
    }

    #[test]
    fn test_assignment_inside_loop_should_reach_enclosing_scope() {
        let source = "for n in range(3):\n    last = n\nprint(last)\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_comprehension_and_handler_targets_should_stay_local() {
        let source = "squares = [v * v for v in range(4)]\nprint(v)\n";
        assert_eq!(issues(source).len(), 1);

        let source = "try:\n    pass\nexcept ValueError as err:\n    print(err)\nprint(err)\n";
        let found = issues(source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line(), 5);
    }

    #[test]
    fn test_nested_comprehension_should_see_earlier_targets() {
        assert!(issues("rows = [[1, 2]]\nflat = [x for row in rows for x in row]\n").is_empty());
    }

    #[test]
    fn test_class_method_should_reference_later_sibling() {
        let source = "class Greeter:\n    def hello(self):\n        return greet_all()\n\n    def greet_all(self):\n        return 'hi'\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_closure_and_nonlocal_should_resolve() {
        let source = "def outer():\n    count = 0\n    def inner():\n        nonlocal count\n        count += 1\n        return count\n    return inner\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_nonlocal_without_binding_should_be_reported() {
        let found = issues("def f():\n    nonlocal missing\n    missing = 1\n");
        assert!(matches!(found[0], ScopeIssue::MissingNonlocal { .. }));
    }

    #[test]
    fn test_global_declaration_should_resolve_module_name() {
        let source = "counter = 0\ndef bump():\n    global counter\n    counter += 1\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_capitalized_annotation_should_be_deferred() {
        let source = "def build() -> Widget:\n    return None\n\nclass Widget:\n    pass\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_match_captures_should_bind_in_arm() {
        let source = "command = ('go', 1)\nmatch command:\n    case (action, amount):\n        print(action, amount)\n    case _:\n        pass\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_walrus_and_lambda_should_bind() {
        let source = "data = [1, 2]\nif (n := len(data)) > 1:\n    print(n)\nsquare = lambda x, y=2: x ** y\n";
        assert!(issues(source).is_empty());
    }

    #[test]
    fn test_star_import_should_silence_unknown_names() {
        assert!(issues("from math import *\nprint(sqrt(2))\n").is_empty());
    }

    #[test]
    fn test_typo_should_suggest_close_name() {
        let found = issues("numbers = [1, 2]\nprint(numbrs)\n");
        match &found[0] {
            ScopeIssue::Undefined { hint, .. } => assert_eq!(hint.as_deref(), Some("numbers")),
            other => panic!("unexpected issue {other:?}"),
        }
    }

    #[test]
    fn test_unused_local_should_be_listed() {
        let report = analyze(&parse_module("def f(a):\n    temp = a * 2\n    return a\n").unwrap());
        assert_eq!(report.unused.len(), 1);
        assert_eq!(report.unused[0].name, "temp");
        assert_eq!(report.unused[0].function, "f");
    }

    #[test]
    fn test_levenshtein_distance_should_count_edits() {
        assert_eq!(levenshtein_distance("hello", "hallo"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }
}
