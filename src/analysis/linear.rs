//! Linear index model.
//!
//! A linear expression is a constant plus an integer-weighted sum of
//! bindings: `c0 + c1*v1 + ... + cn*vn`. Subscripts and loop bounds are
//! reduced to this form before dependence testing.

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::utils::intern::{SymbolId, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A linear expression over resolved bindings.
///
/// Zero coefficients are never stored, so structural equality is the
/// same as index equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearExpr {
    constant: i64,
    coeffs: BTreeMap<SymbolId, i64>,
}

impl LinearExpr {
    /// The zero expression.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant(value: i64) -> Self {
        Self {
            constant: value,
            coeffs: BTreeMap::new(),
        }
    }

    /// A single binding with coefficient 1.
    pub fn var(symbol: SymbolId) -> Self {
        Self::term(symbol, 1)
    }

    /// A single binding with the given coefficient.
    pub fn term(symbol: SymbolId, coeff: i64) -> Self {
        let mut coeffs = BTreeMap::new();
        if coeff != 0 {
            coeffs.insert(symbol, coeff);
        }
        Self { constant: 0, coeffs }
    }

    /// Reduce an expression tree to linear form.
    ///
    /// Recognizes identifiers, integer literals, `+`, `-`, unary `+`/`-`,
    /// and multiplication where one side reduces to a constant. Returns
    /// `None` for any other shape or on arithmetic overflow.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match &expr.kind {
            ExprKind::IntLit(v) => Some(Self::constant(*v)),
            ExprKind::Ident(s) => Some(Self::var(*s)),
            ExprKind::Unary { op: UnaryOp::Plus, operand } => Self::from_expr(operand),
            ExprKind::Unary { op: UnaryOp::Neg, operand } => Self::from_expr(operand)?.checked_neg(),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = Self::from_expr(lhs)?;
                let r = Self::from_expr(rhs)?;
                match op {
                    BinaryOp::Add => l.checked_add(&r),
                    BinaryOp::Sub => l.checked_sub(&r),
                    BinaryOp::Mul => match (l.as_constant(), r.as_constant()) {
                        (Some(c), _) => r.checked_scale(c),
                        (_, Some(c)) => l.checked_scale(c),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The constant term.
    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    /// Coefficient of a binding (0 if absent).
    pub fn coefficient(&self, symbol: SymbolId) -> i64 {
        self.coeffs.get(&symbol).copied().unwrap_or(0)
    }

    /// Non-zero terms in binding order.
    pub fn terms(&self) -> impl Iterator<Item = (SymbolId, i64)> + '_ {
        self.coeffs.iter().map(|(s, c)| (*s, *c))
    }

    /// Bindings with a non-zero coefficient.
    pub fn variables(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.coeffs.keys().copied()
    }

    /// Whether no binding appears.
    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Whether this is the zero expression.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.is_constant()
    }

    /// The value, if no binding appears.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() {
            Some(self.constant)
        } else {
            None
        }
    }

    /// Sum, or `None` on overflow.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut result = self.clone();
        result.constant = result.constant.checked_add(other.constant)?;
        for (s, c) in other.terms() {
            let entry = result.coeffs.entry(s).or_insert(0);
            *entry = entry.checked_add(c)?;
            if *entry == 0 {
                result.coeffs.remove(&s);
            }
        }
        Some(result)
    }

    /// Negation, or `None` when a term is `i64::MIN`.
    pub fn checked_neg(&self) -> Option<Self> {
        self.checked_scale(-1)
    }

    /// Difference, or `None` on overflow.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.checked_neg()?)
    }

    /// Multiply every term by `factor`, or `None` on overflow.
    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        if factor == 0 {
            return Some(Self::zero());
        }
        let mut coeffs = BTreeMap::new();
        for (s, c) in self.terms() {
            coeffs.insert(s, c.checked_mul(factor)?);
        }
        Some(Self {
            constant: self.constant.checked_mul(factor)?,
            coeffs,
        })
    }

    /// Replace `symbol` by a constant value.
    pub fn substitute(&self, symbol: SymbolId, value: i64) -> Option<Self> {
        match self.coeffs.get(&symbol) {
            None => Some(self.clone()),
            Some(c) => {
                let mut result = self.clone();
                result.coeffs.remove(&symbol);
                result.constant = result.constant.checked_add(c.checked_mul(value)?)?;
                Some(result)
            }
        }
    }

    /// Replace every binding for which `lookup` knows a value.
    pub fn fold(&self, lookup: impl Fn(SymbolId) -> Option<i64>) -> Option<Self> {
        let mut result = self.clone();
        for s in self.variables() {
            if let Some(v) = lookup(s) {
                result = result.substitute(s, v)?;
            }
        }
        Some(result)
    }

    /// Render with the spellings from `symbols`.
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> impl fmt::Display + 'a {
        Named { expr: self, symbols }
    }

    fn write_with(&self, f: &mut fmt::Formatter<'_>, name: impl Fn(SymbolId) -> String) -> fmt::Result {
        let mut first = true;
        for (s, c) in self.terms() {
            let sign = if c < 0 { "-" } else { "+" };
            if first {
                if c < 0 {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {} ", sign)?;
            }
            if c.abs() != 1 {
                write!(f, "{}*", c.abs())?;
            }
            write!(f, "{}", name(s))?;
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", self.constant.unsigned_abs())
        } else {
            Ok(())
        }
    }
}

struct Named<'a> {
    expr: &'a LinearExpr,
    symbols: &'a SymbolTable,
}

impl fmt::Display for Named<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.write_with(f, |s| self.symbols.name(s).to_string())
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_with(f, |s| format!("{:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    fn subscript_of(source: &str) -> (SymbolTable, Option<LinearExpr>) {
        let unit = parse(source).unwrap();
        let func = &unit.functions[0];
        let expr = match &func.statements()[0].kind {
            crate::frontend::ast::StmtKind::Expr(e) => match &e.kind {
                ExprKind::Assign { lhs, .. } => match &lhs.kind {
                    ExprKind::Subscript { index, .. } => (**index).clone(),
                    _ => panic!("expected subscript"),
                },
                _ => panic!("expected assignment"),
            },
            _ => panic!("expected expression statement"),
        };
        let linear = LinearExpr::from_expr(&expr);
        (unit.symbols, linear)
    }

    #[test]
    fn test_from_expr_affine() {
        let (symbols, e) = subscript_of("void f(int a[], int i, int n) { a[2*i + n - 3] = 0; }");
        let e = e.unwrap();
        let i = symbols.lookup("i").unwrap();
        let n = symbols.lookup("n").unwrap();
        assert_eq!(e.coefficient(i), 2);
        assert_eq!(e.coefficient(n), 1);
        assert_eq!(e.constant_term(), -3);
        assert_eq!(e.display(&symbols).to_string(), "2*i + n - 3");
    }

    #[test]
    fn test_from_expr_constant_times_paren() {
        let (symbols, e) = subscript_of("void f(int a[], int i) { a[(i + 1) * 4] = 0; }");
        let e = e.unwrap();
        let i = symbols.lookup("i").unwrap();
        assert_eq!(e.coefficient(i), 4);
        assert_eq!(e.constant_term(), 4);
    }

    #[test]
    fn test_from_expr_rejects_nonlinear() {
        let (_, e) = subscript_of("void f(int a[], int i, int j) { a[i * j] = 0; }");
        assert!(e.is_none());
        let (_, e) = subscript_of("void f(int a[], int b[], int i) { a[b[i]] = 0; }");
        assert!(e.is_none());
        let (_, e) = subscript_of("void f(int a[], int i) { a[i / 2] = 0; }");
        assert!(e.is_none());
    }

    #[test]
    fn test_add_neg_is_zero() {
        let mut table = SymbolTable::new();
        let i = table.declare("i", crate::utils::intern::SymbolKind::Scalar, Default::default(), 1);
        let e = LinearExpr::term(i, 3).checked_add(&LinearExpr::constant(7)).unwrap();
        assert!(e.checked_add(&e.checked_neg().unwrap()).unwrap().is_zero());
        assert!(e.checked_sub(&e).unwrap().is_zero());
    }

    #[test]
    fn test_substitute_and_fold() {
        let mut table = SymbolTable::new();
        let n = table.declare("n", crate::utils::intern::SymbolKind::Scalar, Default::default(), 1);
        let i = table.declare("i", crate::utils::intern::SymbolKind::Scalar, Default::default(), 1);
        let e = LinearExpr::var(n)
            .checked_add(&LinearExpr::var(i))
            .and_then(|e| e.checked_add(&LinearExpr::constant(-1)))
            .unwrap();
        let folded = e.fold(|s| if s == n { Some(100) } else { None }).unwrap();
        assert_eq!(folded.constant_term(), 99);
        assert_eq!(folded.coefficient(n), 0);
        assert_eq!(folded.coefficient(i), 1);
    }

    #[test]
    fn test_overflow_rejected() {
        let big = LinearExpr::constant(i64::MAX);
        assert!(big.checked_add(&LinearExpr::constant(1)).is_none());
        assert!(big.checked_scale(2).is_none());
    }

    #[test]
    fn test_negating_min_is_rejected() {
        let mut table = SymbolTable::new();
        let i = table.declare("i", crate::utils::intern::SymbolKind::Scalar, Default::default(), 1);
        assert!(LinearExpr::constant(i64::MIN).checked_neg().is_none());
        assert!(LinearExpr::term(i, i64::MIN).checked_neg().is_none());
        assert!(LinearExpr::zero().checked_sub(&LinearExpr::constant(i64::MIN)).is_none());
        assert_eq!(
            LinearExpr::constant(-1).checked_sub(&LinearExpr::constant(i64::MAX)),
            Some(LinearExpr::constant(i64::MIN))
        );
    }
}
