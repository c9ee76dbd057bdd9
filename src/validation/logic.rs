/*!
 * Heuristic logic checks.
 *
 * Everything reported here is a warning: the checks look at literal shapes
 * in the tree and never try to prove behaviour.
 */

use crate::app_config::ValidationLevel;
use crate::python::ast::*;
use crate::python::visit::{self, Visitor};

use super::ValidationResult;
use super::scope;

/// Subscript indices above this are reported as implausible
const MAX_PLAUSIBLE_INDEX: i64 = 1000;

/// Runs every logic check on a parsed module
pub fn check(module: &Module, level: ValidationLevel, result: &mut ValidationResult) {
    let mut checker = LogicChecker::default();
    checker.check_body(&module.body);
    visit::walk_body(&mut checker, &module.body);

    if level == ValidationLevel::Strict {
        for unused in scope::analyze(module).unused {
            checker.warnings.push((
                unused.line,
                format!("Unused variable '{}' in function '{}'", unused.name, unused.function),
            ));
        }
    }

    checker.warnings.sort_by_key(|(line, _)| *line);
    for (line, message) in checker.warnings {
        result.add_warning(format!("Line {}: {}", line, message));
    }
}

#[derive(Default)]
struct LogicChecker {
    warnings: Vec<(usize, String)>,
}

impl LogicChecker {
    /// Flags the first statement that follows an unconditional jump
    fn check_body(&mut self, body: &[Stmt]) {
        for pair in body.windows(2) {
            let keyword = match pair[0].kind {
                StmtKind::Return(_) => "return",
                StmtKind::Raise { .. } => "raise",
                StmtKind::Break => "break",
                StmtKind::Continue => "continue",
                _ => continue,
            };
            self.warnings.push((
                pair[1].span.line,
                format!("Unreachable code after '{}' statement", keyword),
            ));
            break;
        }
    }

    fn check_while(&mut self, stmt: &Stmt, test: &Expr, body: &[Stmt]) {
        if test.is_constant_true() && !body.iter().any(exits_loop) {
            self.warnings.push((
                stmt.span.line,
                "Potential infinite loop: 'while True' without break or return".to_string(),
            ));
        }
    }

    fn check_function(&mut self, stmt: &Stmt, def: &FunctionDef) {
        let Some(returns) = &def.returns else {
            return;
        };
        if def.name == "__init__" || declares_no_value(returns) || is_stub(&def.body) {
            return;
        }
        let mut finder = ReturnFinder::default();
        visit::walk_body(&mut finder, &def.body);
        if !finder.returns_value && !finder.yields {
            self.warnings.push((
                stmt.span.line,
                format!("Function '{}' declares a return type but never returns a value", def.name),
            ));
        }
    }

    fn check_binop(&mut self, expr: &Expr, left: &Expr, op: Operator, right: &Expr) {
        if op == Operator::Add && (is_str(left) && is_number(right) || is_number(left) && is_str(right)) {
            self.warnings.push((
                expr.span.line,
                "Type mismatch: cannot add string and number; convert with str() or use an f-string"
                    .to_string(),
            ));
        }
        if op.is_division() && is_zero(right) {
            self.warnings.push((expr.span.line, "Potential division by zero".to_string()));
        }
    }
}

impl<'ast> Visitor<'ast> for LogicChecker {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        for body in stmt.child_bodies() {
            self.check_body(body);
        }
        match &stmt.kind {
            StmtKind::While { test, body, .. } => self.check_while(stmt, test, body),
            StmtKind::FunctionDef(def) => self.check_function(stmt, def),
            StmtKind::AugAssign { op, value, .. } if op.is_division() && is_zero(value) => {
                self.warnings.push((stmt.span.line, "Potential division by zero".to_string()));
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        match &expr.kind {
            ExprKind::BinOp { left, op, right } => self.check_binop(expr, left, *op, right),
            ExprKind::Subscript { slice, .. } => {
                if let Some(index) = literal_int(slice).filter(|i| i.abs() > MAX_PLAUSIBLE_INDEX) {
                    self.warnings.push((
                        expr.span.line,
                        format!("Suspiciously large index {} may be out of range", index),
                    ));
                }
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

/// True if the statement can leave the enclosing loop, not counting nested loops or definitions
fn exits_loop(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Break | StmtKind::Return(_) => true,
        StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => false,
        StmtKind::For { orelse, .. } | StmtKind::While { orelse, .. } => orelse.iter().any(exits_loop),
        _ => stmt.child_bodies().into_iter().flatten().any(exits_loop),
    }
}

fn declares_no_value(annotation: &Expr) -> bool {
    annotation.is_none_constant()
        || matches!(annotation.dotted_name().as_deref(), Some("None" | "NoReturn" | "typing.NoReturn" | "Never"))
}

/// Bodies made only of a docstring, `pass`, `...` or a raise
fn is_stub(body: &[Stmt]) -> bool {
    body.iter().all(|stmt| match &stmt.kind {
        StmtKind::Pass | StmtKind::Raise { .. } => true,
        StmtKind::Expr(expr) => matches!(expr.kind, ExprKind::Constant(Constant::Ellipsis | Constant::Str(_))),
        _ => false,
    })
}

#[derive(Default)]
struct ReturnFinder {
    returns_value: bool,
    yields: bool,
}

impl<'ast> Visitor<'ast> for ReturnFinder {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        match &stmt.kind {
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {}
            StmtKind::Return(Some(_)) => {
                self.returns_value = true;
                visit::walk_stmt(self, stmt);
            }
            _ => visit::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        match &expr.kind {
            ExprKind::Lambda { .. } => {}
            ExprKind::Yield(_) | ExprKind::YieldFrom(_) => self.yields = true,
            _ => visit::walk_expr(self, expr),
        }
    }
}

fn is_str(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Constant(Constant::Str(_)) | ExprKind::FormattedString { .. })
}

fn is_number(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Constant(Constant::Int(_) | Constant::Float(_)))
}

fn is_zero(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Constant(c) if c.is_zero())
}

fn literal_int(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Constant(c) => c.as_int(),
        ExprKind::UnaryOp { op: UnaryOp::USub, operand } => literal_int(operand).map(|v| -v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::parse_module;

    fn warnings(code: &str, level: ValidationLevel) -> Vec<String> {
        let module = parse_module(code).unwrap();
        let mut result = ValidationResult::new();
        check(&module, level, &mut result);
        assert!(result.is_valid());
        result.warnings
    }

    #[test]
    fn test_statement_after_return_should_be_unreachable() {
        let found = warnings("def f():\n    return 1\n    print('x')\n", ValidationLevel::Normal);
        assert_eq!(found, vec!["Line 3: Unreachable code after 'return' statement".to_string()]);
    }

    #[test]
    fn test_return_inside_branch_should_not_make_code_unreachable() {
        let code = "def f(x):\n    if x:\n        return 1\n    return 2\n";
        assert!(warnings(code, ValidationLevel::Normal).is_empty());
    }

    #[test]
    fn test_while_true_without_break_should_warn() {
        let found = warnings("while True:\n    print('tick')\n", ValidationLevel::Normal);
        assert!(found[0].contains("infinite loop"));
    }

    #[test]
    fn test_while_true_with_nested_break_should_not_warn() {
        let code = "while True:\n    line = input()\n    if not line:\n        break\n";
        assert!(warnings(code, ValidationLevel::Normal).is_empty());
    }

    #[test]
    fn test_break_of_inner_loop_should_not_count() {
        let code = "while True:\n    for i in range(3):\n        break\n";
        let found = warnings(code, ValidationLevel::Normal);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_annotated_function_without_return_should_warn() {
        let found = warnings("def total(items) -> int:\n    s = sum(items)\n", ValidationLevel::Normal);
        assert!(found.iter().any(|w| w.contains("'total' declares a return type")));
    }

    #[test]
    fn test_missing_return_exemptions() {
        let code = "def a() -> None:\n    print(1)\n\ndef b() -> int:\n    ...\n\ndef c() -> int:\n    yield 1\n\nclass K:\n    def __init__(self) -> int:\n        self.x = 1\n";
        assert!(warnings(code, ValidationLevel::Normal).is_empty());
    }

    #[test]
    fn test_zero_divisor_should_warn() {
        let found = warnings("x = 10 / 0\ny = 3\ny //= 0\n", ValidationLevel::Normal);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|w| w.contains("division by zero")));
    }

    #[test]
    fn test_large_literal_index_should_warn() {
        let found = warnings("items = [1]\nprint(items[5000])\n", ValidationLevel::Normal);
        assert_eq!(found, vec!["Line 2: Suspiciously large index 5000 may be out of range".to_string()]);
    }

    #[test]
    fn test_string_plus_number_should_warn() {
        let found = warnings("label = 'count: ' + 3\n", ValidationLevel::Normal);
        assert!(found[0].contains("cannot add string and number"));
    }

    #[test]
    fn test_unused_variable_only_in_strict_mode() {
        let code = "def f():\n    temp = 1\n    return 2\n";
        assert!(warnings(code, ValidationLevel::Normal).is_empty());
        let strict = warnings(code, ValidationLevel::Strict);
        assert!(strict.iter().any(|w| w.contains("Unused variable 'temp'")));
    }
}
