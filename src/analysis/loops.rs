//! Counted-loop recognition and loop-nest queries.
//!
//! A counted loop has the shape
//!
//! ```text
//! for (i = lo; i < hi; i++)        // or `int i = lo`, `<=`, `++i`,
//!                                  // `i += c`, `i = i + c` with c > 0
//! ```
//!
//! Only counted loops take part in dependence analysis; their bounds become
//! constraints of the dependence system.

use crate::analysis::constprop::{written_variables, ConstEnv};
use crate::analysis::linear::LinearExpr;
use crate::frontend::ast::{AssignOp, BinaryOp, Expr, ExprKind, ForStmt, Initializer, LoopId, Stmt, StmtKind, UnaryOp};
use crate::utils::intern::SymbolId;

/// A `for` loop in normalized counted form.
#[derive(Debug, Clone)]
pub struct CountedLoop {
    /// Loop handle
    pub id: LoopId,
    /// Induction variable
    pub index: SymbolId,
    /// Whether the header declares the index (`for (int i = ...)`)
    pub declares_index: bool,
    /// Initial value of the index
    pub lower: Expr,
    /// Right-hand side of the condition, as written
    pub upper: Expr,
    /// `<=` rather than `<`
    pub inclusive: bool,
    /// Positive constant step
    pub step: i64,
}

impl CountedLoop {
    /// Recognize a counted loop, or `None` if the header has another shape.
    pub fn recognize(stmt: &ForStmt) -> Option<Self> {
        let (index, lower, declares_index) = match &stmt.init.as_deref()?.kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Assign { op: AssignOp::Assign, lhs, rhs },
                ..
            }) => (lhs.as_ident()?, (**rhs).clone(), false),
            StmtKind::Decl(decls) => match decls.as_slice() {
                [d] if d.dims.is_empty() && !d.pointer => match &d.init {
                    Some(Initializer::Expr(e)) => (d.symbol, e.clone(), true),
                    _ => return None,
                },
                _ => return None,
            },
            _ => return None,
        };

        let (upper, inclusive) = match &stmt.cond.as_ref()?.kind {
            ExprKind::Binary { op: BinaryOp::Lt, lhs, rhs } if lhs.as_ident() == Some(index) => {
                ((**rhs).clone(), false)
            }
            ExprKind::Binary { op: BinaryOp::Le, lhs, rhs } if lhs.as_ident() == Some(index) => {
                ((**rhs).clone(), true)
            }
            _ => return None,
        };

        let step = increment_step(stmt.incr.as_ref()?, index)?;
        if step <= 0 {
            return None;
        }

        Some(Self {
            id: stmt.id,
            index,
            declares_index,
            lower,
            upper,
            inclusive,
            step,
        })
    }

    /// Lower bound in linear form.
    pub fn lower_linear(&self) -> Option<LinearExpr> {
        LinearExpr::from_expr(&self.lower)
    }

    /// Inclusive upper bound in linear form (`hi - 1` for `<`).
    pub fn upper_linear(&self) -> Option<LinearExpr> {
        let upper = LinearExpr::from_expr(&self.upper)?;
        if self.inclusive {
            Some(upper)
        } else {
            upper.checked_add(&LinearExpr::constant(-1))
        }
    }

    /// Constant lower bound under `env`.
    pub fn lower_bound(&self, env: &ConstEnv) -> Option<i64> {
        env.evaluate(&self.lower)
    }

    /// Constant inclusive upper bound under `env`.
    pub fn inclusive_upper_bound(&self, env: &ConstEnv) -> Option<i64> {
        let upper = env.evaluate(&self.upper)?;
        if self.inclusive {
            Some(upper)
        } else {
            upper.checked_sub(1)
        }
    }

    /// Number of iterations, if both bounds are constant.
    pub fn trip_count(&self, env: &ConstEnv) -> Option<i64> {
        let lo = self.lower_bound(env)?;
        let hi = self.inclusive_upper_bound(env)?;
        if hi < lo {
            return Some(0);
        }
        Some((hi.checked_sub(lo)? / self.step).checked_add(1)?)
    }
}

fn increment_step(incr: &Expr, index: SymbolId) -> Option<i64> {
    match &incr.kind {
        ExprKind::Unary {
            op: UnaryOp::PostInc | UnaryOp::PreInc,
            operand,
        } if operand.as_ident() == Some(index) => Some(1),
        ExprKind::Assign {
            op: AssignOp::Compound(BinaryOp::Add),
            lhs,
            rhs,
        } if lhs.as_ident() == Some(index) => rhs.as_int(),
        ExprKind::Assign {
            op: AssignOp::Assign,
            lhs,
            rhs,
        } if lhs.as_ident() == Some(index) => match &rhs.kind {
            ExprKind::Binary { op: BinaryOp::Add, lhs: a, rhs: b } => {
                if a.as_ident() == Some(index) {
                    b.as_int()
                } else if b.as_ident() == Some(index) {
                    a.as_int()
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

/// The loop itself plus each loop that is the only statement of its
/// parent's body, outermost first.
pub fn perfect_nest_headers(outer: &ForStmt) -> Vec<&ForStmt> {
    let mut headers = vec![outer];
    let mut current = outer;
    while let Some(next) = sole_loop(&current.body) {
        headers.push(next);
        current = next;
    }
    headers
}

fn sole_loop(body: &Stmt) -> Option<&ForStmt> {
    match &body.kind {
        StmtKind::For(f) => Some(f),
        StmtKind::Compound(stmts) => match stmts.as_slice() {
            [only] => only.as_for(),
            _ => None,
        },
        _ => None,
    }
}

/// Body of the innermost loop of the perfect nest rooted at `outer`.
pub fn innermost_body(outer: &ForStmt) -> &Stmt {
    let headers = perfect_nest_headers(outer);
    let last = headers.last().copied().unwrap_or(outer);
    &last.body
}

/// First statement of the innermost body that is not a null statement,
/// declaration, nested loop, assignment, op-assignment or increment.
pub fn first_unsupported_statement(outer: &ForStmt) -> Option<&Stmt> {
    innermost_body(outer)
        .statements()
        .iter()
        .find(|s| !is_simple_body_statement(s))
}

fn is_simple_body_statement(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Null | StmtKind::Decl(_) | StmtKind::For(_) => true,
        StmtKind::Expr(e) => match &e.kind {
            ExprKind::Assign { .. } => true,
            ExprKind::Unary { op, .. } => op.is_increment(),
            _ => false,
        },
        _ => false,
    }
}

/// First statement under `stmt` that transfers control out of the
/// iteration (`break`, `continue`, `goto`, `return`, a label).
pub fn first_unsupported_op(stmt: &Stmt) -> Option<&Stmt> {
    match &stmt.kind {
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Return(_)
        | StmtKind::Label { .. } => Some(stmt),
        StmtKind::Compound(stmts) => stmts.iter().find_map(first_unsupported_op),
        StmtKind::For(f) => first_unsupported_op(&f.body),
        StmtKind::If { then_branch, else_branch, .. } => first_unsupported_op(then_branch)
            .or_else(|| else_branch.as_deref().and_then(first_unsupported_op)),
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::Switch { body, .. } => {
            first_unsupported_op(body)
        }
        _ => None,
    }
}

/// Whether the body of `stmt` assigns its induction variable.
pub fn writes_index(stmt: &ForStmt, index: SymbolId) -> bool {
    written_variables(&stmt.body).contains(&index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::TranslationUnit;
    use crate::frontend::parse;

    fn first_loop(unit: &TranslationUnit) -> &ForStmt {
        unit.functions[0]
            .statements()
            .iter()
            .find_map(|s| s.as_for())
            .expect("no loop")
    }

    #[test]
    fn test_recognize_forms() {
        let forms = [
            "for (i = 0; i < n; i++) ;",
            "for (int k = 0; k <= n; ++k) ;",
            "for (i = 1; i < n; i += 2) ;",
            "for (i = 0; i < n; i = i + 4) ;",
            "for (i = 0; i < n; i = 3 + i) ;",
            "for (long i = 0; i < s.len; i++) ;",
        ];
        for form in forms {
            let source = format!("void f(int n) {{ int i; {} }}", form);
            let unit = parse(&source).unwrap();
            assert!(CountedLoop::recognize(first_loop(&unit)).is_some(), "{}", form);
        }
    }

    #[test]
    fn test_reject_forms() {
        let forms = [
            "for (i = 0; i > n; i++) ;",
            "for (i = 0; i < n; i--) ;",
            "for (i = 0; i < n; i += 0) ;",
            "for (i = 0; j < n; i++) ;",
            "for (i = 0; i < n; j++) ;",
            "for (; i < n; i++) ;",
            "for (i = 0; ; i++) ;",
            "for (i = 0; i < n; i *= 2) ;",
        ];
        for form in forms {
            let source = format!("void f(int n) {{ int i, j; {} }}", form);
            let unit = parse(&source).unwrap();
            assert!(CountedLoop::recognize(first_loop(&unit)).is_none(), "{}", form);
        }
    }

    #[test]
    fn test_bounds() {
        let unit = parse("void f(int n) { int i; for (i = 2; i < 10; i += 3) ; }").unwrap();
        let l = CountedLoop::recognize(first_loop(&unit)).unwrap();
        let env = ConstEnv::empty();
        assert_eq!(l.lower_bound(&env), Some(2));
        assert_eq!(l.inclusive_upper_bound(&env), Some(9));
        assert_eq!(l.trip_count(&env), Some(3));
        assert_eq!(l.step, 3);
        assert_eq!(l.upper_linear().unwrap().as_constant(), Some(9));
    }

    #[test]
    fn test_symbolic_upper() {
        let unit = parse("void f(int n) { for (int i = 0; i < n; i++) ; }").unwrap();
        let l = CountedLoop::recognize(first_loop(&unit)).unwrap();
        let n = unit.symbols.lookup("n").unwrap();
        let upper = l.upper_linear().unwrap();
        assert_eq!(upper.coefficient(n), 1);
        assert_eq!(upper.constant_term(), -1);
        assert_eq!(l.inclusive_upper_bound(&ConstEnv::empty()), None);
        assert_eq!(l.inclusive_upper_bound(&ConstEnv::empty().set(n, 5)), Some(4));
    }

    #[test]
    fn test_perfect_nest() {
        let unit = parse(
            "void f(int n, double a[n][n]) {
                for (int i = 0; i < n; i++) {
                    for (int j = 0; j < n; j++)
                        for (int k = 0; k < n; k++) { a[i][j] = k; }
                }
            }",
        )
        .unwrap();
        let outer = first_loop(&unit);
        assert_eq!(perfect_nest_headers(outer).len(), 3);
        assert_eq!(innermost_body(outer).statements().len(), 1);
        assert!(first_unsupported_statement(outer).is_none());
    }

    #[test]
    fn test_imperfect_nest() {
        let unit = parse(
            "void f(int n, double a[]) {
                for (int i = 0; i < n; i++) {
                    a[i] = 0;
                    for (int j = 0; j < n; j++) a[j] = 1;
                }
            }",
        )
        .unwrap();
        assert_eq!(perfect_nest_headers(first_loop(&unit)).len(), 1);
    }

    #[test]
    fn test_unsupported_statements() {
        let unit = parse("void f(int n, double a[]) { for (int i = 0; i < n; i++) { if (a[i]) a[i] = 0; } }").unwrap();
        assert!(first_unsupported_statement(first_loop(&unit)).is_some());

        let unit = parse("void f(int n, double a[]) { for (int i = 0; i < n; i++) { if (a[i]) break; } }").unwrap();
        let found = first_unsupported_op(&first_loop(&unit).body).unwrap();
        assert!(matches!(found.kind, StmtKind::Break));
    }

    #[test]
    fn test_writes_index() {
        let unit = parse("void f(int n) { for (int i = 0; i < n; i++) { i = i + 1; } }").unwrap();
        let l = first_loop(&unit);
        let counted = CountedLoop::recognize(l).unwrap();
        assert!(writes_index(l, counted.index));
    }
}
