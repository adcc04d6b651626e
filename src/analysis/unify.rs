//! Structural matching of loop headers.
//!
//! Two headers unify when they have the same shape and their bindings can
//! be renamed consistently: a substitution that maps every binding of the
//! second header to exactly one binding of the first, never mapping two
//! bindings to the same one. Loop bodies take no part in the match.

use crate::frontend::ast::{Declarator, Expr, ExprKind, ForStmt, Initializer, Stmt, StmtKind};
use crate::utils::intern::SymbolId;
use std::collections::BTreeMap;

/// Substitution from the second header's bindings to the first's, if the
/// headers unify.
pub fn unify_headers(first: &ForStmt, second: &ForStmt) -> Option<BTreeMap<SymbolId, SymbolId>> {
    let mut u = Unifier::default();
    let init = match (&first.init, &second.init) {
        (Some(a), Some(b)) => u.stmt(a, b),
        (None, None) => true,
        _ => false,
    };
    let matched = init && u.opt_expr(&first.cond, &second.cond) && u.opt_expr(&first.incr, &second.incr);
    if matched {
        Some(u.forward)
    } else {
        None
    }
}

#[derive(Default)]
struct Unifier {
    /// second -> first
    forward: BTreeMap<SymbolId, SymbolId>,
    /// first -> second
    reverse: BTreeMap<SymbolId, SymbolId>,
}

impl Unifier {
    fn bind(&mut self, pattern: SymbolId, other: SymbolId) -> bool {
        match (self.forward.get(&other), self.reverse.get(&pattern)) {
            (None, None) => {
                self.forward.insert(other, pattern);
                self.reverse.insert(pattern, other);
                true
            }
            (Some(p), Some(o)) => *p == pattern && *o == other,
            _ => false,
        }
    }

    fn stmt(&mut self, a: &Stmt, b: &Stmt) -> bool {
        match (&a.kind, &b.kind) {
            (StmtKind::Expr(x), StmtKind::Expr(y)) => self.expr(x, y),
            (StmtKind::Decl(xs), StmtKind::Decl(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.declarator(x, y))
            }
            (StmtKind::Null, StmtKind::Null) => true,
            _ => false,
        }
    }

    fn declarator(&mut self, a: &Declarator, b: &Declarator) -> bool {
        if a.pointer != b.pointer || a.dims.len() != b.dims.len() || !self.bind(a.symbol, b.symbol) {
            return false;
        }
        for (x, y) in a.dims.iter().zip(&b.dims) {
            if !self.opt_expr(x, y) {
                return false;
            }
        }
        match (&a.init, &b.init) {
            (Some(x), Some(y)) => self.initializer(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    fn initializer(&mut self, a: &Initializer, b: &Initializer) -> bool {
        match (a, b) {
            (Initializer::Expr(x), Initializer::Expr(y)) => self.expr(x, y),
            (Initializer::List(xs), Initializer::List(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.initializer(x, y))
            }
            _ => false,
        }
    }

    fn opt_expr(&mut self, a: &Option<Expr>, b: &Option<Expr>) -> bool {
        match (a, b) {
            (Some(x), Some(y)) => self.expr(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    fn exprs(&mut self, a: &[Expr], b: &[Expr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.expr(x, y))
    }

    fn expr(&mut self, a: &Expr, b: &Expr) -> bool {
        use ExprKind::*;
        match (&a.kind, &b.kind) {
            (IntLit(x), IntLit(y)) => x == y,
            (FloatLit(x), FloatLit(y)) => x.to_bits() == y.to_bits(),
            (CharLit(x), CharLit(y)) | (StrLit(x), StrLit(y)) => x == y,
            (Ident(x), Ident(y)) => self.bind(*x, *y),
            (
                Field { owner: o1, field: f1, arrow: a1 },
                Field { owner: o2, field: f2, arrow: a2 },
            ) => a1 == a2 && self.bind(*f1, *f2) && self.expr(o1, o2),
            (Subscript { base: b1, index: i1 }, Subscript { base: b2, index: i2 }) => {
                self.expr(b1, b2) && self.expr(i1, i2)
            }
            (Call { callee: c1, args: a1 }, Call { callee: c2, args: a2 }) => {
                self.expr(c1, c2) && self.exprs(a1, a2)
            }
            (Unary { op: p1, operand: x }, Unary { op: p2, operand: y }) => p1 == p2 && self.expr(x, y),
            (Binary { op: p1, lhs: l1, rhs: r1 }, Binary { op: p2, lhs: l2, rhs: r2 }) => {
                p1 == p2 && self.expr(l1, l2) && self.expr(r1, r2)
            }
            (Assign { op: p1, lhs: l1, rhs: r1 }, Assign { op: p2, lhs: l2, rhs: r2 }) => {
                p1 == p2 && self.expr(l1, l2) && self.expr(r1, r2)
            }
            (
                Conditional { cond: c1, then_expr: t1, else_expr: e1 },
                Conditional { cond: c2, then_expr: t2, else_expr: e2 },
            ) => self.expr(c1, c2) && self.expr(t1, t2) && self.expr(e1, e2),
            (Cast { ty: t1, expr: x }, Cast { ty: t2, expr: y }) => t1 == t2 && self.expr(x, y),
            (SizeOf(Some(x)), SizeOf(Some(y))) => self.expr(x, y),
            (SizeOf(None), SizeOf(None)) => true,
            (Comma(xs), Comma(ys)) => self.exprs(xs, ys),
            _ => false,
        }
    }
}
