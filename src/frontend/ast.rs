//! Normalized syntax tree for the C subset.
//!
//! Statement and expression kinds are closed enums, so every analysis that
//! walks the tree has to say what it does with each form. Identifiers are
//! already resolved to [`SymbolId`]s; spans are kept for diagnostics only.

use crate::utils::intern::{SymbolId, SymbolTable};
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A parsed translation unit together with its symbol arena.
#[derive(Debug)]
pub struct TranslationUnit {
    /// Function definitions, in source order
    pub functions: Vec<Function>,
    /// File-scope declarations
    pub globals: Vec<Stmt>,
    /// Every binding referenced by the tree
    pub symbols: SymbolTable,
}

impl TranslationUnit {
    /// Find a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Binding of the function name
    pub symbol: SymbolId,
    /// Parameters
    pub params: Vec<Declarator>,
    /// Function body (always a compound statement)
    pub body: Stmt,
    /// Source span
    pub span: Span,
}

impl Function {
    /// Top-level statements of the body.
    pub fn statements(&self) -> &[Stmt] {
        self.body.statements()
    }
}

/// Per-unit handle of a `for` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    /// The kind of statement
    pub kind: StmtKind,
    /// Source span
    pub span: Span,
    /// `#pragma` lines immediately preceding the statement, verbatim
    pub pragmas: Vec<String>,
}

/// The kind of a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Declaration: `int x = 1, a[10];`
    Decl(Vec<Declarator>),
    /// Expression statement: `expr;`
    Expr(Expr),
    /// `for (init; cond; incr) body`
    For(ForStmt),
    /// `{ stmts }`
    Compound(Vec<Stmt>),
    /// `;`
    Null,
    /// `if (cond) then else otherwise`
    If {
        /// Controlling expression
        cond: Expr,
        /// Taken when `cond` is nonzero
        then_branch: Box<Stmt>,
        /// `else` arm, if any
        else_branch: Option<Box<Stmt>>,
    },
    /// `return expr;`
    Return(Option<Expr>),
    /// `while (cond) body`
    While {
        /// Tested before each iteration
        cond: Expr,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `do body while (cond);`
    DoWhile {
        /// Loop body, run at least once
        body: Box<Stmt>,
        /// Tested after each iteration
        cond: Expr,
    },
    /// `switch (cond) body`
    Switch {
        /// Value matched against the case labels
        cond: Expr,
        /// Body holding the labels
        body: Box<Stmt>,
    },
    /// `case value:` label
    Case(Expr),
    /// `default:` label
    Default,
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `goto label;`
    Goto(String),
    /// `label: body`
    Label {
        /// Label name
        name: String,
        /// Labelled statement
        body: Box<Stmt>,
    },
}

impl StmtKind {
    /// Short description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            StmtKind::Decl(_) => "declaration",
            StmtKind::Expr(_) => "expression statement",
            StmtKind::For(_) => "for loop",
            StmtKind::Compound(_) => "compound statement",
            StmtKind::Null => "null statement",
            StmtKind::If { .. } => "if statement",
            StmtKind::Return(_) => "return statement",
            StmtKind::While { .. } => "while loop",
            StmtKind::DoWhile { .. } => "do-while loop",
            StmtKind::Switch { .. } => "switch statement",
            StmtKind::Case(_) => "case label",
            StmtKind::Default => "default label",
            StmtKind::Break => "break statement",
            StmtKind::Continue => "continue statement",
            StmtKind::Goto(_) => "goto statement",
            StmtKind::Label { .. } => "labeled statement",
        }
    }
}

/// A `for` statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStmt {
    /// Unique handle within the translation unit
    pub id: LoopId,
    /// Initializer (declaration or expression statement)
    pub init: Option<Box<Stmt>>,
    /// Condition
    pub cond: Option<Expr>,
    /// Increment
    pub incr: Option<Expr>,
    /// Loop body
    pub body: Box<Stmt>,
}

impl Stmt {
    /// Create a statement without pragmas.
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self {
            kind,
            span,
            pragmas: Vec::new(),
        }
    }

    /// The `for` payload, if this is a loop.
    pub fn as_for(&self) -> Option<&ForStmt> {
        match &self.kind {
            StmtKind::For(f) => Some(f),
            _ => None,
        }
    }

    /// Statements of a compound statement, or the statement itself.
    pub fn statements(&self) -> &[Stmt] {
        match &self.kind {
            StmtKind::Compound(stmts) => stmts,
            _ => std::slice::from_ref(self),
        }
    }

    /// Replace every occurrence of a binding according to `map`.
    pub fn rename(&mut self, map: &BTreeMap<SymbolId, SymbolId>) {
        match &mut self.kind {
            StmtKind::Decl(decls) => {
                for d in decls {
                    d.rename(map);
                }
            }
            StmtKind::Expr(e) | StmtKind::Case(e) => e.rename(map),
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    e.rename(map);
                }
            }
            StmtKind::For(f) => {
                if let Some(init) = &mut f.init {
                    init.rename(map);
                }
                for e in f.cond.iter_mut().chain(f.incr.iter_mut()) {
                    e.rename(map);
                }
                f.body.rename(map);
            }
            StmtKind::Compound(stmts) => {
                for s in stmts {
                    s.rename(map);
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                cond.rename(map);
                then_branch.rename(map);
                if let Some(e) = else_branch {
                    e.rename(map);
                }
            }
            StmtKind::While { cond, body }
            | StmtKind::DoWhile { body, cond }
            | StmtKind::Switch { cond, body } => {
                cond.rename(map);
                body.rename(map);
            }
            StmtKind::Label { body, .. } => body.rename(map),
            StmtKind::Null
            | StmtKind::Default
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Goto(_) => {}
        }
    }
}

/// One declarator of a declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    /// The declared binding
    pub symbol: SymbolId,
    /// Array dimensions, outermost first; `None` for `[]`
    pub dims: Vec<Option<Expr>>,
    /// Declared with at least one `*`
    pub pointer: bool,
    /// Initializer
    pub init: Option<Initializer>,
    /// Storage class from the declaration specifiers
    #[serde(default)]
    pub storage: StorageClass,
    /// Source span
    pub span: Span,
}

/// Storage class of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageClass {
    /// Automatic storage: a fresh object each time the block is entered
    #[default]
    Auto,
    /// `static`: one object for the whole program run
    Static,
    /// `extern`: an object defined elsewhere
    Extern,
}

impl StorageClass {
    /// Storage class named by a specifier list such as `static const int`.
    pub fn from_specifiers(specifiers: &str) -> Self {
        specifiers
            .split_whitespace()
            .find_map(|word| match word {
                "static" => Some(StorageClass::Static),
                "extern" => Some(StorageClass::Extern),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Whether every entry into the enclosing block creates a new object.
    pub fn is_automatic(self) -> bool {
        self == StorageClass::Auto
    }
}

impl Declarator {
    fn rename(&mut self, map: &BTreeMap<SymbolId, SymbolId>) {
        if let Some(to) = map.get(&self.symbol) {
            self.symbol = *to;
        }
        for dim in self.dims.iter_mut().flatten() {
            dim.rename(map);
        }
        if let Some(init) = &mut self.init {
            init.rename(map);
        }
    }
}

/// Declarator initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    /// `= expr`
    Expr(Expr),
    /// `= { ... }`
    List(Vec<Initializer>),
}

impl Initializer {
    fn rename(&mut self, map: &BTreeMap<SymbolId, SymbolId>) {
        match self {
            Initializer::Expr(e) => e.rename(map),
            Initializer::List(items) => {
                for item in items {
                    item.rename(map);
                }
            }
        }
    }
}

/// An expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    /// The kind of expression
    pub kind: ExprKind,
    /// Source span
    pub span: Span,
}

/// The kind of an expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLit(i64),
    /// Floating-point literal
    FloatLit(f64),
    /// Character literal, raw text between quotes
    CharLit(String),
    /// String literal, raw text between quotes
    StrLit(String),

    /// Resolved identifier
    Ident(SymbolId),

    /// `owner.field` or `owner->field`
    Field {
        /// Struct value or pointer
        owner: Box<Expr>,
        /// Member name
        field: SymbolId,
        /// `->` rather than `.`
        arrow: bool,
    },

    /// `base[index]`
    Subscript {
        /// Array or pointer being indexed
        base: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },

    /// `callee(args)`
    Call {
        /// Called function
        callee: Box<Expr>,
        /// Arguments in source order
        args: Vec<Expr>,
    },

    /// Prefix or postfix operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },

    /// `lhs op rhs`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },

    /// `lhs = rhs` or `lhs op= rhs`
    Assign {
        /// Plain or compound assignment
        op: AssignOp,
        /// Assigned location
        lhs: Box<Expr>,
        /// Assigned value
        rhs: Box<Expr>,
    },

    /// `cond ? then_expr : else_expr`
    Conditional {
        /// Selector
        cond: Box<Expr>,
        /// Value when `cond` is nonzero
        then_expr: Box<Expr>,
        /// Value otherwise
        else_expr: Box<Expr>,
    },

    /// `(type) expr`
    Cast {
        /// Target type as written
        ty: String,
        /// Converted expression
        expr: Box<Expr>,
    },

    /// `sizeof expr`, or `sizeof(type)` when `None`
    SizeOf(Option<Box<Expr>>),

    /// `a, b, c`
    Comma(Vec<Expr>),
}

impl Expr {
    /// Create a new expression.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Create an integer literal.
    pub fn int_lit(value: i64, span: Span) -> Self {
        Self::new(ExprKind::IntLit(value), span)
    }

    /// Create a resolved identifier.
    pub fn ident(symbol: SymbolId, span: Span) -> Self {
        Self::new(ExprKind::Ident(symbol), span)
    }

    /// The binding, if this is a plain identifier.
    pub fn as_ident(&self) -> Option<SymbolId> {
        match self.kind {
            ExprKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// The value, if this is an integer literal (possibly negated).
    pub fn as_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::IntLit(v) => Some(*v),
            ExprKind::Unary { op: UnaryOp::Neg, operand } => operand.as_int().and_then(i64::checked_neg),
            ExprKind::Unary { op: UnaryOp::Plus, operand } => operand.as_int(),
            _ => None,
        }
    }

    /// Replace every occurrence of a binding according to `map`.
    pub fn rename(&mut self, map: &BTreeMap<SymbolId, SymbolId>) {
        match &mut self.kind {
            ExprKind::Ident(s) => {
                if let Some(to) = map.get(s) {
                    *s = *to;
                }
            }
            ExprKind::Field { owner, .. } => owner.rename(map),
            ExprKind::Subscript { base, index } => {
                base.rename(map);
                index.rename(map);
            }
            ExprKind::Call { callee, args } => {
                callee.rename(map);
                for a in args {
                    a.rename(map);
                }
            }
            ExprKind::Unary { operand, .. } => operand.rename(map),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs, .. } => {
                lhs.rename(map);
                rhs.rename(map);
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                cond.rename(map);
                then_expr.rename(map);
                else_expr.rename(map);
            }
            ExprKind::Cast { expr, .. } => expr.rename(map),
            ExprKind::SizeOf(Some(e)) => e.rename(map),
            ExprKind::Comma(items) => {
                for e in items {
                    e.rename(map);
                }
            }
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::SizeOf(None) => {}
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `&x`
    AddrOf,
    /// `*x`
    Deref,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
    /// `x++`
    PostInc,
    /// `x--`
    PostDec,
}

impl UnaryOp {
    /// Whether the operator writes its operand.
    pub fn is_increment(&self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::AddrOf => "&",
            UnaryOp::Deref => "*",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        };
        write!(f, "{}", s)
    }
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `op=`
    Compound(BinaryOp),
}

impl AssignOp {
    /// The arithmetic part of a compound assignment.
    pub fn binary(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Compound(op) => Some(*op),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::Compound(op) => write!(f, "{}=", op),
        }
    }
}

/// Visitor trait for traversing the tree.
///
/// Every method has a default that walks the children, so implementors
/// override only the nodes they care about and call the `walk_*` function
/// to continue into children.
pub trait AstVisitor {
    /// Visit a statement.
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit a declarator.
    fn visit_declarator(&mut self, decl: &Declarator) {
        walk_declarator(self, decl);
    }

    /// Visit an expression.
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

/// Visit the children of a statement.
pub fn walk_stmt<V: AstVisitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Decl(decls) => {
            for d in decls {
                v.visit_declarator(d);
            }
        }
        StmtKind::Expr(e) | StmtKind::Case(e) => v.visit_expr(e),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                v.visit_expr(e);
            }
        }
        StmtKind::For(f) => {
            if let Some(init) = &f.init {
                v.visit_stmt(init);
            }
            if let Some(c) = &f.cond {
                v.visit_expr(c);
            }
            if let Some(i) = &f.incr {
                v.visit_expr(i);
            }
            v.visit_stmt(&f.body);
        }
        StmtKind::Compound(stmts) => {
            for s in stmts {
                v.visit_stmt(s);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            v.visit_expr(cond);
            v.visit_stmt(then_branch);
            if let Some(e) = else_branch {
                v.visit_stmt(e);
            }
        }
        StmtKind::While { cond, body } | StmtKind::Switch { cond, body } => {
            v.visit_expr(cond);
            v.visit_stmt(body);
        }
        StmtKind::DoWhile { body, cond } => {
            v.visit_stmt(body);
            v.visit_expr(cond);
        }
        StmtKind::Label { body, .. } => v.visit_stmt(body),
        StmtKind::Null | StmtKind::Default | StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) => {}
    }
}

/// Visit the children of a declarator.
pub fn walk_declarator<V: AstVisitor + ?Sized>(v: &mut V, decl: &Declarator) {
    for dim in decl.dims.iter().flatten() {
        v.visit_expr(dim);
    }
    if let Some(init) = &decl.init {
        walk_initializer(v, init);
    }
}

fn walk_initializer<V: AstVisitor + ?Sized>(v: &mut V, init: &Initializer) {
    match init {
        Initializer::Expr(e) => v.visit_expr(e),
        Initializer::List(items) => {
            for item in items {
                walk_initializer(v, item);
            }
        }
    }
}

/// Visit the children of an expression.
pub fn walk_expr<V: AstVisitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Field { owner, .. } => v.visit_expr(owner),
        ExprKind::Subscript { base, index } => {
            v.visit_expr(base);
            v.visit_expr(index);
        }
        ExprKind::Call { callee, args } => {
            v.visit_expr(callee);
            for a in args {
                v.visit_expr(a);
            }
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        ExprKind::Conditional { cond, then_expr, else_expr } => {
            v.visit_expr(cond);
            v.visit_expr(then_expr);
            v.visit_expr(else_expr);
        }
        ExprKind::Cast { expr, .. } => v.visit_expr(expr),
        ExprKind::SizeOf(Some(e)) => v.visit_expr(e),
        ExprKind::Comma(items) => {
            for e in items {
                v.visit_expr(e);
            }
        }
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::CharLit(_)
        | ExprKind::StrLit(_)
        | ExprKind::Ident(_)
        | ExprKind::SizeOf(None) => {}
    }
}

/// Every binding referenced or declared under a statement.
pub fn referenced_symbols(stmt: &Stmt) -> std::collections::BTreeSet<SymbolId> {
    struct Collect(std::collections::BTreeSet<SymbolId>);
    impl AstVisitor for Collect {
        fn visit_declarator(&mut self, decl: &Declarator) {
            self.0.insert(decl.symbol);
            walk_declarator(self, decl);
        }
        fn visit_expr(&mut self, expr: &Expr) {
            match &expr.kind {
                ExprKind::Ident(s) => {
                    self.0.insert(*s);
                }
                ExprKind::Field { field, .. } => {
                    self.0.insert(*field);
                }
                _ => {}
            }
            walk_expr(self, expr);
        }
    }
    let mut c = Collect(Default::default());
    c.visit_stmt(stmt);
    c.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::intern::SymbolKind;

    fn ident(table: &mut SymbolTable, name: &str) -> (SymbolId, Expr) {
        let id = table.declare(name, SymbolKind::Scalar, Span::dummy(), 1);
        (id, Expr::ident(id, Span::dummy()))
    }

    #[test]
    fn test_op_display() {
        assert_eq!(BinaryOp::Shl.to_string(), "<<");
        assert_eq!(AssignOp::Compound(BinaryOp::Add).to_string(), "+=");
        assert_eq!(UnaryOp::PostInc.to_string(), "++");
    }

    #[test]
    fn test_as_int() {
        let neg = Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::int_lit(4, Span::dummy())),
            },
            Span::dummy(),
        );
        assert_eq!(neg.as_int(), Some(-4));
    }

    #[test]
    fn test_rename_and_collect() {
        let mut table = SymbolTable::new();
        let (i, ei) = ident(&mut table, "i");
        let (j, _) = ident(&mut table, "j");
        let (a, ea) = ident(&mut table, "a");
        let sub = Expr::new(
            ExprKind::Subscript {
                base: Box::new(ea),
                index: Box::new(ei),
            },
            Span::dummy(),
        );
        let mut stmt = Stmt::new(StmtKind::Expr(sub), Span::dummy());
        assert_eq!(referenced_symbols(&stmt).into_iter().collect::<Vec<_>>(), vec![i, a]);

        let map = BTreeMap::from([(i, j)]);
        stmt.rename(&map);
        let syms = referenced_symbols(&stmt);
        assert!(syms.contains(&j));
        assert!(!syms.contains(&i));
    }
}
