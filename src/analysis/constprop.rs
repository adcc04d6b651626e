//! Constant propagation.
//!
//! A forward pass over a function body that records, before each `for`
//! statement, which scalars hold a known integer value. Both arms of an
//! `if` are propagated and intersected; a loop forgets every variable it
//! writes; anything the pass does not understand forgets everything.

use crate::frontend::ast::{
    AssignOp, AstVisitor, BinaryOp, Declarator, Expr, ExprKind, Function, Initializer, LoopId, Stmt, StmtKind,
    UnaryOp, walk_expr,
};
use crate::utils::intern::SymbolId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Known constant values at one program point.
///
/// Never updated in place: every transfer produces a new environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstEnv {
    values: BTreeMap<SymbolId, i64>,
}

impl ConstEnv {
    /// An environment that knows nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Known value of `symbol`.
    pub fn get(&self, symbol: SymbolId) -> Option<i64> {
        self.values.get(&symbol).copied()
    }

    /// A copy with `symbol` bound to `value`.
    pub fn set(&self, symbol: SymbolId, value: i64) -> Self {
        let mut values = self.values.clone();
        values.insert(symbol, value);
        Self { values }
    }

    /// A copy without a binding for `symbol`.
    pub fn without(&self, symbol: SymbolId) -> Self {
        if !self.values.contains_key(&symbol) {
            return self.clone();
        }
        let mut values = self.values.clone();
        values.remove(&symbol);
        Self { values }
    }

    /// A copy without bindings for any of `symbols`.
    pub fn without_all<'a>(&self, symbols: impl IntoIterator<Item = &'a SymbolId>) -> Self {
        let mut values = self.values.clone();
        for s in symbols {
            values.remove(s);
        }
        Self { values }
    }

    /// Bindings on which both environments agree.
    pub fn intersect(&self, other: &Self) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(s, v)| other.values.get(s) == Some(v))
            .map(|(s, v)| (*s, *v))
            .collect();
        Self { values }
    }

    /// Number of known bindings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is known.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluate an integer expression, if every operand is known.
    pub fn evaluate(&self, expr: &Expr) -> Option<i64> {
        evaluate(expr, self)
    }
}

/// Evaluate `expr` under `env`.
///
/// Handles literals, known identifiers, arithmetic, bitwise, relational and
/// logical operators, the conditional operator and casts. Division by zero
/// and overflow yield `None`.
pub fn evaluate(expr: &Expr, env: &ConstEnv) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntLit(v) => Some(*v),
        ExprKind::CharLit(text) => char_value(text),
        ExprKind::Ident(s) => env.get(*s),
        ExprKind::Unary { op, operand } => {
            let v = evaluate(operand, env)?;
            match op {
                UnaryOp::Plus => Some(v),
                UnaryOp::Neg => v.checked_neg(),
                UnaryOp::Not => Some((v == 0) as i64),
                UnaryOp::BitNot => Some(!v),
                _ => None,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = evaluate(lhs, env)?;
            // Short-circuit forms only need the left side when it decides.
            match op {
                BinaryOp::And if l == 0 => return Some(0),
                BinaryOp::Or if l != 0 => return Some(1),
                _ => {}
            }
            let r = evaluate(rhs, env)?;
            binary(*op, l, r)
        }
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            if evaluate(cond, env)? != 0 {
                evaluate(then_expr, env)
            } else {
                evaluate(else_expr, env)
            }
        }
        ExprKind::Cast { expr, .. } => evaluate(expr, env),
        _ => None,
    }
}

fn binary(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        BinaryOp::Mul => l.checked_mul(r),
        BinaryOp::Div => l.checked_div(r),
        BinaryOp::Mod => l.checked_rem(r),
        BinaryOp::Shl => u32::try_from(r).ok().and_then(|r| l.checked_shl(r)),
        BinaryOp::Shr => u32::try_from(r).ok().and_then(|r| l.checked_shr(r)),
        BinaryOp::BitAnd => Some(l & r),
        BinaryOp::BitOr => Some(l | r),
        BinaryOp::BitXor => Some(l ^ r),
        BinaryOp::Eq => Some((l == r) as i64),
        BinaryOp::Ne => Some((l != r) as i64),
        BinaryOp::Lt => Some((l < r) as i64),
        BinaryOp::Le => Some((l <= r) as i64),
        BinaryOp::Gt => Some((l > r) as i64),
        BinaryOp::Ge => Some((l >= r) as i64),
        BinaryOp::And => Some((l != 0 && r != 0) as i64),
        BinaryOp::Or => Some((l != 0 || r != 0) as i64),
    }
}

fn char_value(text: &str) -> Option<i64> {
    let mut chars = text.chars();
    let value = match (chars.next()?, chars.next()) {
        (c, None) => c as i64,
        ('\\', Some('n')) => 10,
        ('\\', Some('t')) => 9,
        ('\\', Some('0')) => 0,
        ('\\', Some(c)) => c as i64,
        _ => return None,
    };
    Some(value)
}

/// Every binding assigned, incremented or declared under `stmt`.
pub fn written_variables(stmt: &Stmt) -> BTreeSet<SymbolId> {
    struct Writes(BTreeSet<SymbolId>);

    impl Writes {
        fn target(&mut self, lhs: &Expr) {
            match &lhs.kind {
                ExprKind::Ident(s) => {
                    self.0.insert(*s);
                }
                ExprKind::Subscript { base, .. } => self.target(base),
                ExprKind::Field { owner, field, .. } => {
                    self.0.insert(*field);
                    self.target(owner);
                }
                ExprKind::Unary { op: UnaryOp::AddrOf, operand } => self.target(operand),
                _ => {}
            }
        }
    }

    impl AstVisitor for Writes {
        fn visit_declarator(&mut self, decl: &Declarator) {
            self.0.insert(decl.symbol);
            crate::frontend::ast::walk_declarator(self, decl);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            match &expr.kind {
                ExprKind::Assign { lhs, .. } => self.target(lhs),
                ExprKind::Unary { op, operand } if op.is_increment() => self.target(operand),
                // Anything passed by address may be written by the callee.
                ExprKind::Unary { op: UnaryOp::AddrOf, operand } => self.target(operand),
                _ => {}
            }
            walk_expr(self, expr);
        }
    }

    let mut writes = Writes(BTreeSet::new());
    writes.visit_stmt(stmt);
    writes.0
}

/// Result of constant propagation over one function.
#[derive(Debug, Clone, Default)]
pub struct ConstantPropagation {
    loops: HashMap<LoopId, ConstEnv>,
    exit: ConstEnv,
}

impl ConstantPropagation {
    /// Propagate constants through a function body.
    pub fn for_function(function: &Function) -> Self {
        Self::for_statements(function.statements(), ConstEnv::empty())
    }

    /// Propagate constants through a statement sequence from `entry`.
    pub fn for_statements(stmts: &[Stmt], entry: ConstEnv) -> Self {
        let mut pass = Self::default();
        let mut env = entry;
        for stmt in stmts {
            env = pass.transfer(stmt, env);
        }
        pass.exit = env;
        log::trace!("constant propagation recorded {} loop entries", pass.loops.len());
        pass
    }

    /// Values known on every iteration of `id`.
    ///
    /// Variables the loop writes (its index included) are never in this set.
    pub fn env_at(&self, id: LoopId) -> Option<&ConstEnv> {
        self.loops.get(&id)
    }

    /// Values known after the last statement.
    pub fn exit_env(&self) -> &ConstEnv {
        &self.exit
    }

    /// Evaluate `expr` as seen on every iteration of `id`.
    pub fn evaluate_in(&self, id: LoopId, expr: &Expr) -> Option<i64> {
        self.env_at(id).and_then(|env| env.evaluate(expr))
    }

    fn transfer(&mut self, stmt: &Stmt, env: ConstEnv) -> ConstEnv {
        match &stmt.kind {
            StmtKind::Null => env,
            StmtKind::Decl(decls) => decls.iter().fold(env, |env, d| declare(d, env)),
            StmtKind::Expr(e) => assign(e, env),
            StmtKind::Compound(stmts) => stmts.iter().fold(env, |env, s| self.transfer(s, env)),
            StmtKind::If { cond, then_branch, else_branch } => {
                if has_side_effects(cond) {
                    // Visit the arms for their loops, but trust nothing.
                    self.transfer(then_branch, ConstEnv::empty());
                    if let Some(e) = else_branch {
                        self.transfer(e, ConstEnv::empty());
                    }
                    return ConstEnv::empty();
                }
                let then_env = self.transfer(then_branch, env.clone());
                let else_env = match else_branch {
                    Some(e) => self.transfer(e, env),
                    None => env,
                };
                then_env.intersect(&else_env)
            }
            StmtKind::For(f) => {
                let written = written_variables(stmt);
                let entry = match &f.init {
                    Some(init) => self.transfer(init, env),
                    None => env,
                };
                let invariant = entry.without_all(&written);
                self.loops.insert(f.id, invariant.clone());
                self.transfer(&f.body, invariant.clone());
                invariant
            }
            _ => {
                self.visit_nested_loops(stmt);
                ConstEnv::empty()
            }
        }
    }

    /// Record loops under a statement the pass cannot follow.
    fn visit_nested_loops(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::Switch { body, .. }
            | StmtKind::Label { body, .. } => {
                self.transfer(body, ConstEnv::empty());
            }
            _ => {}
        }
    }
}

fn declare(decl: &Declarator, env: ConstEnv) -> ConstEnv {
    // A static keeps its value from earlier calls; the initializer runs once.
    if !decl.dims.is_empty() || decl.pointer || !decl.storage.is_automatic() {
        return env.without(decl.symbol);
    }
    match &decl.init {
        Some(Initializer::Expr(e)) if !has_side_effects(e) => match env.evaluate(e) {
            Some(v) => env.set(decl.symbol, v),
            None => env.without(decl.symbol),
        },
        Some(Initializer::Expr(_)) | Some(Initializer::List(_)) => ConstEnv::empty(),
        None => env.without(decl.symbol),
    }
}

fn assign(expr: &Expr, env: ConstEnv) -> ConstEnv {
    match &expr.kind {
        ExprKind::Assign { op, lhs, rhs } if !has_side_effects(rhs) => match &lhs.kind {
            ExprKind::Ident(s) => {
                let value = match op {
                    AssignOp::Assign => env.evaluate(rhs),
                    AssignOp::Compound(bin) => {
                        let old = env.get(*s);
                        let r = env.evaluate(rhs);
                        old.zip(r).and_then(|(l, r)| binary(*bin, l, r))
                    }
                };
                match value {
                    Some(v) => env.set(*s, v),
                    None => env.without(*s),
                }
            }
            // Array elements and fields are not tracked.
            ExprKind::Subscript { .. } | ExprKind::Field { .. } if !has_side_effects(lhs) => env,
            _ => ConstEnv::empty(),
        },
        ExprKind::Unary { op, operand } if op.is_increment() => match &operand.kind {
            ExprKind::Ident(s) => {
                let delta = match op {
                    UnaryOp::PreInc | UnaryOp::PostInc => 1,
                    _ => -1,
                };
                match env.get(*s).and_then(|v| v.checked_add(delta)) {
                    Some(v) => env.set(*s, v),
                    None => env.without(*s),
                }
            }
            ExprKind::Subscript { .. } | ExprKind::Field { .. } if !has_side_effects(operand) => env,
            _ => ConstEnv::empty(),
        },
        _ => ConstEnv::empty(),
    }
}

/// Whether evaluating `expr` may write memory.
fn has_side_effects(expr: &Expr) -> bool {
    struct Finder(bool);
    impl AstVisitor for Finder {
        fn visit_expr(&mut self, expr: &Expr) {
            match &expr.kind {
                ExprKind::Assign { .. } | ExprKind::Call { .. } => self.0 = true,
                ExprKind::Unary { op, .. } if op.is_increment() => self.0 = true,
                _ => walk_expr(self, expr),
            }
        }
    }
    let mut finder = Finder(false);
    finder.visit_expr(expr);
    finder.0
}
