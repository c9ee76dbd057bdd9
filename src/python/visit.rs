/*!
 * Read-only traversal over the syntax tree.
 *
 * Implementors override the `visit_*` hooks they care about and call the
 * matching `walk_*` function to continue into children.
 */

use super::ast::*;

pub trait Visitor<'ast> {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }

    fn visit_pattern(&mut self, pattern: &'ast Pattern) {
        walk_pattern(self, pattern);
    }

    fn visit_parameters(&mut self, params: &'ast Parameters) {
        walk_parameters(self, params);
    }
}

pub fn walk_body<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, body: &'a [Stmt]) {
    for stmt in body {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, stmt: &'a Stmt) {
    match &stmt.kind {
        StmtKind::FunctionDef(def) => {
            for decorator in &def.decorators {
                visitor.visit_expr(decorator);
            }
            visitor.visit_parameters(&def.params);
            if let Some(returns) = &def.returns {
                visitor.visit_expr(returns);
            }
            walk_body(visitor, &def.body);
        }
        StmtKind::ClassDef(def) => {
            for decorator in &def.decorators {
                visitor.visit_expr(decorator);
            }
            for base in &def.bases {
                visitor.visit_expr(base);
            }
            for keyword in &def.keywords {
                visitor.visit_expr(&keyword.value);
            }
            walk_body(visitor, &def.body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Delete(targets) => {
            for target in targets {
                visitor.visit_expr(target);
            }
        }
        StmtKind::Assign { targets, value } => {
            visitor.visit_expr(value);
            for target in targets {
                visitor.visit_expr(target);
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr(value);
            visitor.visit_expr(target);
        }
        StmtKind::AnnAssign { target, annotation, value } => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
            visitor.visit_expr(annotation);
            visitor.visit_expr(target);
        }
        StmtKind::For { target, iter, body, orelse, .. } => {
            visitor.visit_expr(iter);
            visitor.visit_expr(target);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::While { test, body, orelse } | StmtKind::If { test, body, orelse } => {
            visitor.visit_expr(test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::With { items, body, .. } => {
            for item in items {
                visitor.visit_expr(&item.context_expr);
                if let Some(vars) = &item.optional_vars {
                    visitor.visit_expr(vars);
                }
            }
            walk_body(visitor, body);
        }
        StmtKind::Match { subject, cases } => {
            visitor.visit_expr(subject);
            for case in cases {
                visitor.visit_pattern(&case.pattern);
                if let Some(guard) = &case.guard {
                    visitor.visit_expr(guard);
                }
                walk_body(visitor, &case.body);
            }
        }
        StmtKind::Raise { exc, cause } => {
            if let Some(exc) = exc {
                visitor.visit_expr(exc);
            }
            if let Some(cause) = cause {
                visitor.visit_expr(cause);
            }
        }
        StmtKind::Try { body, handlers, orelse, finalbody, .. } => {
            walk_body(visitor, body);
            for handler in handlers {
                if let Some(type_) = &handler.type_ {
                    visitor.visit_expr(type_);
                }
                walk_body(visitor, &handler.body);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
        StmtKind::Assert { test, msg } => {
            visitor.visit_expr(test);
            if let Some(msg) = msg {
                visitor.visit_expr(msg);
            }
        }
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Import(_)
        | StmtKind::ImportFrom { .. }
        | StmtKind::Global(_)
        | StmtKind::Nonlocal(_)
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue => {}
    }
}

pub fn walk_parameters<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, params: &'a Parameters) {
    for param in &params.params {
        if let Some(annotation) = &param.annotation {
            visitor.visit_expr(annotation);
        }
        if let Some(default) = &param.default {
            visitor.visit_expr(default);
        }
    }
}

fn walk_comprehensions<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, generators: &'a [Comprehension]) {
    for generator in generators {
        visitor.visit_expr(&generator.iter);
        visitor.visit_expr(&generator.target);
        for cond in &generator.ifs {
            visitor.visit_expr(cond);
        }
    }
}

pub fn walk_expr<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, expr: &'a Expr) {
    match &expr.kind {
        ExprKind::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        ExprKind::NamedExpr { target, value } => {
            visitor.visit_expr(value);
            visitor.visit_expr(target);
        }
        ExprKind::BinOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Lambda { params, body } => {
            visitor.visit_parameters(params);
            visitor.visit_expr(body);
        }
        ExprKind::IfExp { test, body, orelse } => {
            visitor.visit_expr(test);
            visitor.visit_expr(body);
            visitor.visit_expr(orelse);
        }
        ExprKind::Dict { keys, values } => {
            for key in keys.iter().flatten() {
                visitor.visit_expr(key);
            }
            for value in values {
                visitor.visit_expr(value);
            }
        }
        ExprKind::Set(elts) | ExprKind::List { elts, .. } | ExprKind::Tuple { elts, .. } => {
            for elt in elts {
                visitor.visit_expr(elt);
            }
        }
        ExprKind::ListComp { elt, generators }
        | ExprKind::SetComp { elt, generators }
        | ExprKind::GeneratorExp { elt, generators } => {
            walk_comprehensions(visitor, generators);
            visitor.visit_expr(elt);
        }
        ExprKind::DictComp { key, value, generators } => {
            walk_comprehensions(visitor, generators);
            visitor.visit_expr(key);
            visitor.visit_expr(value);
        }
        ExprKind::Await(value) | ExprKind::YieldFrom(value) => visitor.visit_expr(value),
        ExprKind::Yield(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        ExprKind::Compare { left, comparators, .. } => {
            visitor.visit_expr(left);
            for comparator in comparators {
                visitor.visit_expr(comparator);
            }
        }
        ExprKind::Call { func, args, keywords } => {
            visitor.visit_expr(func);
            for arg in args {
                visitor.visit_expr(arg);
            }
            for keyword in keywords {
                visitor.visit_expr(&keyword.value);
            }
        }
        ExprKind::FormattedString { values, .. } => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        ExprKind::Attribute { value, .. } | ExprKind::Starred { value, .. } => visitor.visit_expr(value),
        ExprKind::Subscript { value, slice, .. } => {
            visitor.visit_expr(value);
            visitor.visit_expr(slice);
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                visitor.visit_expr(part);
            }
        }
        ExprKind::Constant(_) | ExprKind::Name { .. } => {}
    }
}

pub fn walk_pattern<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, pattern: &'a Pattern) {
    match &pattern.kind {
        PatternKind::Value(expr) => visitor.visit_expr(expr),
        PatternKind::Singleton(_) | PatternKind::Star(_) => {}
        PatternKind::Sequence(patterns) | PatternKind::Or(patterns) => {
            for p in patterns {
                visitor.visit_pattern(p);
            }
        }
        PatternKind::Mapping { keys, patterns, .. } => {
            for key in keys {
                visitor.visit_expr(key);
            }
            for p in patterns {
                visitor.visit_pattern(p);
            }
        }
        PatternKind::Class { cls, patterns, kwd_patterns, .. } => {
            visitor.visit_expr(cls);
            for p in patterns.iter().chain(kwd_patterns) {
                visitor.visit_pattern(p);
            }
        }
        PatternKind::As { pattern, .. } => {
            if let Some(p) = pattern {
                visitor.visit_pattern(p);
            }
        }
    }
}

/// Counts statements, expressions and patterns in a module
pub fn node_count(module: &Module) -> usize {
    struct Counter(usize);

    impl<'ast> Visitor<'ast> for Counter {
        fn visit_stmt(&mut self, stmt: &'ast Stmt) {
            self.0 += 1;
            walk_stmt(self, stmt);
        }

        fn visit_expr(&mut self, expr: &'ast Expr) {
            self.0 += 1;
            walk_expr(self, expr);
        }

        fn visit_pattern(&mut self, pattern: &'ast Pattern) {
            self.0 += 1;
            walk_pattern(self, pattern);
        }
    }

    let mut counter = Counter(1);
    walk_body(&mut counter, &module.body);
    counter.0
}
