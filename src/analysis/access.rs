//! Variable access collection.
//!
//! The collector walks the statements under analysis and lists every read
//! and write of a variable or array element, in lexical order, tagged with
//! the counted loops that enclose it. Anything outside the supported subset
//! fails the whole collection with an [`UnsupportedConstruct`].
//!
//! Calls are summarized through a [`CallSummary`]: the engine never decides
//! on its own which callees are harmless.

use crate::analysis::dependence::DependenceType;
use crate::analysis::linear::LinearExpr;
use crate::analysis::loops::CountedLoop;
use crate::config::AnalysisConfig;
use crate::frontend::ast::{
    walk_expr, AstVisitor, Declarator, Expr, ExprKind, ForStmt, Function, Initializer, LoopId, Stmt, StmtKind,
    TranslationUnit, UnaryOp,
};
use crate::utils::errors::{AnalysisError, AnalysisResult, UnsupportedConstruct, UnsupportedKind};
use crate::utils::intern::{SymbolId, SymbolKind, SymbolTable};
use crate::utils::location::Span;
use crate::utils::progress::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One read or write of a variable at a program point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAccess {
    /// The binding accessed
    pub symbol: SymbolId,
    /// Write (or declaration) rather than read
    pub is_write: bool,
    /// Per-dimension subscripts for array element accesses; `None` entries
    /// are subscripts that did not reduce to linear form
    pub subscripts: Option<Vec<Option<LinearExpr>>>,
    /// Enclosing counted loops inside the analyzed region, outermost first
    pub loops: Vec<LoopId>,
    /// Lexical index of the enclosing statement
    pub statement: usize,
    /// Index of the enclosing statement within the body of the outermost
    /// enclosing loop (within the region when outside every loop)
    pub top_level: usize,
    /// Position in the access list
    pub order: usize,
    /// Produced by a declarator
    pub is_declaration: bool,
    /// Source location
    pub span: Span,
}

impl VariableAccess {
    /// Read rather than write.
    pub fn is_read(&self) -> bool {
        !self.is_write
    }

    /// Whether the access has no subscripts.
    pub fn is_scalar(&self) -> bool {
        self.subscripts.is_none()
    }

    /// Whether both accesses name the same binding.
    pub fn same_variable(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }

    /// Number of leading enclosing loops shared with `other`.
    pub fn common_loops(&self, other: &Self) -> usize {
        self.loops
            .iter()
            .zip(&other.loops)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Whether at least one enclosing loop is shared with `other`.
    pub fn is_in_common_loops_with(&self, other: &Self) -> bool {
        self.common_loops(other) > 0
    }

    /// Whether this access executes before `other` in the same iteration.
    ///
    /// Within one statement the reads are evaluated before the write.
    pub fn lexically_precedes(&self, other: &Self) -> bool {
        self.statement < other.statement
            || (self.statement == other.statement && self.is_read() && other.is_write)
    }

    /// Dependence type from this access (source) to `other` (sink).
    pub fn dependence_type_to(&self, other: &Self) -> DependenceType {
        match (self.is_write, other.is_write) {
            (true, false) => DependenceType::Flow,
            (false, true) => DependenceType::Anti,
            (true, true) => DependenceType::Output,
            (false, false) => DependenceType::Input,
        }
    }

    /// All subscripts, if every one is linear.
    pub fn linear_subscripts(&self) -> Option<Vec<&LinearExpr>> {
        self.subscripts.as_ref()?.iter().map(Option::as_ref).collect()
    }
}

/// Pessimistic summary of what a call may touch.
pub trait CallSummary {
    /// Variables a call to `callee` may read and write, beyond its arguments.
    fn accessed_by_call(&self, callee: &str) -> Vec<SymbolId>;
}

/// Calls to whitelisted functions touch nothing; any other call may touch
/// every address-taken variable of the caller and every global it uses.
#[derive(Debug, Clone, Default)]
pub struct WhitelistCallSummary {
    whitelist: BTreeSet<String>,
    exposed: BTreeSet<SymbolId>,
}

impl WhitelistCallSummary {
    /// Summary with an explicit exposed set.
    pub fn new(whitelist: BTreeSet<String>, exposed: BTreeSet<SymbolId>) -> Self {
        Self { whitelist, exposed }
    }

    /// Summary for calls made from `function`.
    pub fn for_function(unit: &TranslationUnit, function: &Function, config: &AnalysisConfig) -> Self {
        let mut exposed = address_taken(function, &unit.symbols);
        let globals: BTreeSet<SymbolId> = unit
            .globals
            .iter()
            .flat_map(|s| match &s.kind {
                StmtKind::Decl(decls) => decls.iter().map(|d| d.symbol).collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .filter(|s| unit.symbols.kind(*s) != SymbolKind::Function)
            .collect();
        let used = crate::frontend::ast::referenced_symbols(&function.body);
        exposed.extend(globals.intersection(&used));
        log::debug!(
            "call summary for '{}': {} exposed variables",
            function.name,
            exposed.len()
        );
        Self::new(config.function_whitelist.clone(), exposed)
    }

    /// Variables any non-whitelisted call may touch.
    pub fn exposed(&self) -> &BTreeSet<SymbolId> {
        &self.exposed
    }
}

impl CallSummary for WhitelistCallSummary {
    fn accessed_by_call(&self, callee: &str) -> Vec<SymbolId> {
        if self.whitelist.contains(callee) {
            Vec::new()
        } else {
            self.exposed.iter().copied().collect()
        }
    }
}

/// Variables whose address escapes in `function`: operands of `&` and
/// arrays or pointers passed by name to a call.
pub fn address_taken(function: &Function, symbols: &SymbolTable) -> BTreeSet<SymbolId> {
    struct Finder<'a> {
        symbols: &'a SymbolTable,
        found: BTreeSet<SymbolId>,
    }

    impl Finder<'_> {
        fn base(&mut self, expr: &Expr) {
            match &expr.kind {
                ExprKind::Ident(s) => {
                    self.found.insert(*s);
                }
                ExprKind::Subscript { base, .. } => self.base(base),
                ExprKind::Field { owner, .. } => self.base(owner),
                _ => {}
            }
        }
    }

    impl AstVisitor for Finder<'_> {
        fn visit_expr(&mut self, expr: &Expr) {
            match &expr.kind {
                ExprKind::Unary { op: UnaryOp::AddrOf, operand } => self.base(operand),
                ExprKind::Call { args, .. } => {
                    for arg in args {
                        if let Some(s) = arg.as_ident() {
                            if matches!(
                                self.symbols.kind(s),
                                SymbolKind::Array { .. } | SymbolKind::Pointer
                            ) {
                                self.found.insert(s);
                            }
                        }
                    }
                }
                _ => {}
            }
            walk_expr(self, expr);
        }
    }

    let mut finder = Finder {
        symbols,
        found: BTreeSet::new(),
    };
    finder.visit_stmt(&function.body);
    finder.found
}

/// Accesses of one region plus the counted loops they sit in.
#[derive(Debug, Clone, Default)]
pub struct AccessSet {
    /// Accesses in lexical order
    pub accesses: Vec<VariableAccess>,
    /// Every counted loop of the region
    pub loops: BTreeMap<LoopId, CountedLoop>,
}

/// Walks a statement region and produces its [`AccessSet`].
pub struct AccessCollector<'a> {
    symbols: &'a SymbolTable,
    calls: &'a dyn CallSummary,
    strict_subscripts: bool,
    max_accesses: Option<usize>,
    token: CancellationToken,
    accesses: Vec<VariableAccess>,
    nest: Vec<CountedLoop>,
    known: BTreeMap<LoopId, CountedLoop>,
    statement: usize,
    top_level: usize,
}

impl<'a> AccessCollector<'a> {
    /// Create a collector.
    pub fn new(symbols: &'a SymbolTable, calls: &'a dyn CallSummary, config: &AnalysisConfig) -> Self {
        Self {
            symbols,
            calls,
            strict_subscripts: config.strict_subscripts,
            max_accesses: config.max_accesses,
            token: CancellationToken::new(),
            accesses: Vec::new(),
            nest: Vec::new(),
            known: BTreeMap::new(),
            statement: 0,
            top_level: 0,
        }
    }

    /// Observe `token` between statements.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Collect every access of `stmts`.
    pub fn collect(mut self, stmts: &[Stmt]) -> AnalysisResult<AccessSet> {
        self.token.check()?;
        for (k, stmt) in stmts.iter().enumerate() {
            self.top_level = k;
            self.collect_stmt(stmt)?;
            self.token.check()?;
        }
        if let Some(limit) = self.max_accesses {
            if self.accesses.len() > limit {
                return Err(AnalysisError::invalid(format!(
                    "region has {} accesses, more than the configured limit of {}",
                    self.accesses.len(),
                    limit
                )));
            }
        }
        log::debug!(
            "collected {} accesses in {} loops",
            self.accesses.len(),
            self.known.len()
        );
        Ok(AccessSet {
            accesses: self.accesses,
            loops: self.known,
        })
    }

    fn collect_stmt(&mut self, stmt: &Stmt) -> AnalysisResult<()> {
        match &stmt.kind {
            StmtKind::Null => Ok(()),
            StmtKind::Decl(decls) => {
                self.statement += 1;
                for d in decls {
                    self.collect_declarator(d)?;
                }
                Ok(())
            }
            StmtKind::Expr(e) => {
                self.statement += 1;
                match &e.kind {
                    ExprKind::Assign { .. } | ExprKind::Call { .. } => self.collect_expr(e),
                    ExprKind::Unary { op, .. } if op.is_increment() => self.collect_expr(e),
                    _ => Err(unsupported(
                        UnsupportedKind::Statement,
                        "expression statement is not an assignment, increment or call",
                        stmt.span,
                    )),
                }
            }
            StmtKind::Compound(stmts) => {
                for s in stmts {
                    self.collect_stmt(s)?;
                }
                Ok(())
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.statement += 1;
                self.collect_expr(cond)?;
                self.collect_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    self.collect_stmt(e)?;
                }
                Ok(())
            }
            StmtKind::For(f) => self.collect_loop(f, stmt.span),
            other => Err(unsupported(
                UnsupportedKind::Statement,
                format!("{} is not supported", other.describe()),
                stmt.span,
            )),
        }
    }

    fn collect_loop(&mut self, f: &ForStmt, span: Span) -> AnalysisResult<()> {
        let counted = CountedLoop::recognize(f).ok_or_else(|| {
            unsupported(
                UnsupportedKind::LoopHeader,
                "loop header is not in counted form",
                span,
            )
        })?;
        self.known.insert(f.id, counted.clone());
        let outermost = self.nest.is_empty();
        self.nest.push(counted);
        if outermost {
            for (k, s) in f.body.statements().iter().enumerate() {
                self.top_level = k;
                self.collect_stmt(s)?;
            }
        } else {
            self.collect_stmt(&f.body)?;
        }
        self.nest.pop();
        Ok(())
    }

    fn collect_declarator(&mut self, decl: &Declarator) -> AnalysisResult<()> {
        if decl.pointer {
            return Err(unsupported(
                UnsupportedKind::Declaration,
                format!("pointer declaration of '{}' is not supported", self.symbols.name(decl.symbol)),
                decl.span,
            ));
        }
        for dim in decl.dims.iter().flatten() {
            self.collect_expr(dim)?;
        }
        self.push(decl.symbol, true, None, decl.span, decl.storage.is_automatic())?;
        if let Some(init) = &decl.init {
            self.collect_initializer(init)?;
        }
        Ok(())
    }

    fn collect_initializer(&mut self, init: &Initializer) -> AnalysisResult<()> {
        match init {
            Initializer::Expr(e) => self.collect_expr(e),
            Initializer::List(items) => {
                for item in items {
                    self.collect_initializer(item)?;
                }
                Ok(())
            }
        }
    }

    /// Record the write performed by an assignment to `lhs`.
    fn collect_target(&mut self, lhs: &Expr) -> AnalysisResult<()> {
        match &lhs.kind {
            ExprKind::Ident(s) => self.push(*s, true, None, lhs.span, false),
            ExprKind::Field { owner, field, .. } => {
                self.collect_owner(owner)?;
                self.push(*field, true, None, lhs.span, false)
            }
            ExprKind::Subscript { .. } => self.collect_subscript(lhs, true),
            ExprKind::Unary { op: UnaryOp::Deref, .. } => Err(unsupported(
                UnsupportedKind::Expression,
                "assignment through a pointer dereference is not supported",
                lhs.span,
            )),
            _ => Err(unsupported(
                UnsupportedKind::Expression,
                "assignment target is not a variable, field or array element",
                lhs.span,
            )),
        }
    }

    /// The owner of a field reference is always recorded as a read.
    fn collect_owner(&mut self, owner: &Expr) -> AnalysisResult<()> {
        match &owner.kind {
            ExprKind::Ident(s) => self.push(*s, false, None, owner.span, false),
            ExprKind::Subscript { .. } => self.collect_subscript(owner, false),
            _ => Err(unsupported(
                UnsupportedKind::Expression,
                "field reference on a complex owner is not supported",
                owner.span,
            )),
        }
    }

    fn collect_subscript(&mut self, expr: &Expr, is_write: bool) -> AnalysisResult<()> {
        let mut indices = Vec::new();
        let mut base = expr;
        while let ExprKind::Subscript { base: b, index } = &base.kind {
            indices.push(&**index);
            base = b;
        }
        indices.reverse();
        let array = base.as_ident().ok_or_else(|| {
            unsupported(
                UnsupportedKind::Subscript,
                "subscripted expression is not an array name",
                expr.span,
            )
        })?;

        let subscripts: Vec<Option<LinearExpr>> = indices.iter().map(|e| LinearExpr::from_expr(e)).collect();
        if self.strict_subscripts {
            if let Some(pos) = subscripts.iter().position(Option::is_none) {
                return Err(unsupported(
                    UnsupportedKind::Subscript,
                    format!("subscript of '{}' is not affine", self.symbols.name(array)),
                    indices[pos].span,
                ));
            }
        }
        self.push(array, is_write, Some(subscripts), expr.span, false)?;
        for index in indices {
            self.collect_expr(index)?;
        }
        Ok(())
    }

    fn collect_expr(&mut self, expr: &Expr) -> AnalysisResult<()> {
        match &expr.kind {
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::SizeOf(_) => Ok(()),
            ExprKind::Ident(s) => {
                if self.symbols.kind(*s) == SymbolKind::Function {
                    Ok(())
                } else {
                    self.push(*s, false, None, expr.span, false)
                }
            }
            ExprKind::Field { owner, field, .. } => {
                self.collect_owner(owner)?;
                self.push(*field, false, None, expr.span, false)
            }
            ExprKind::Subscript { .. } => self.collect_subscript(expr, false),
            ExprKind::Call { callee, args } => self.collect_call(expr, callee, args),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Plus | UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot => self.collect_expr(operand),
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                    self.collect_expr(operand)?;
                    self.collect_target(operand)
                }
                UnaryOp::AddrOf => self.collect_address(operand),
                UnaryOp::Deref => Err(unsupported(
                    UnsupportedKind::Expression,
                    "pointer dereference is not supported",
                    expr.span,
                )),
            },
            ExprKind::Binary { lhs, rhs, .. } => {
                self.collect_expr(lhs)?;
                self.collect_expr(rhs)
            }
            ExprKind::Assign { op, lhs, rhs } => {
                self.collect_target(lhs)?;
                if op.binary().is_some() {
                    self.collect_expr(lhs)?;
                }
                self.collect_expr(rhs)
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                self.collect_expr(cond)?;
                self.collect_expr(then_expr)?;
                self.collect_expr(else_expr)
            }
            ExprKind::Cast { expr, .. } => self.collect_expr(expr),
            ExprKind::Comma(items) => {
                for e in items {
                    self.collect_expr(e)?;
                }
                Ok(())
            }
        }
    }

    /// `&x` reads nothing; `&a[i]` reads the index expressions.
    fn collect_address(&mut self, operand: &Expr) -> AnalysisResult<()> {
        match &operand.kind {
            ExprKind::Ident(_) => Ok(()),
            ExprKind::Subscript { base, index } => {
                self.collect_expr(index)?;
                self.collect_address(base)
            }
            ExprKind::Field { owner, .. } => self.collect_address(owner),
            _ => Err(unsupported(
                UnsupportedKind::Expression,
                "address of a complex expression is not supported",
                operand.span,
            )),
        }
    }

    fn collect_call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> AnalysisResult<()> {
        let function = callee.as_ident().ok_or_else(|| {
            unsupported(
                UnsupportedKind::Expression,
                "call through a function pointer is not supported",
                callee.span,
            )
        })?;
        for arg in args {
            self.collect_expr(arg)?;
        }
        let name = self.symbols.name(function);
        let touched = self.calls.accessed_by_call(name);
        if !touched.is_empty() {
            log::trace!("call to '{}' may access {} variables", name, touched.len());
        }
        for symbol in touched {
            self.push(symbol, false, None, call.span, false)?;
            self.push(symbol, true, None, call.span, false)?;
        }
        Ok(())
    }

    fn push(
        &mut self,
        symbol: SymbolId,
        is_write: bool,
        subscripts: Option<Vec<Option<LinearExpr>>>,
        span: Span,
        is_declaration: bool,
    ) -> AnalysisResult<()> {
        if is_write && self.nest.iter().any(|l| l.index == symbol) {
            return Err(unsupported(
                UnsupportedKind::IndexWrite,
                format!("loop index '{}' is written inside its loop", self.symbols.name(symbol)),
                span,
            ));
        }
        let order = self.accesses.len();
        self.accesses.push(VariableAccess {
            symbol,
            is_write,
            subscripts,
            loops: self.nest.iter().map(|l| l.id).collect(),
            statement: self.statement,
            top_level: self.top_level,
            order,
            is_declaration,
            span,
        });
        Ok(())
    }
}

fn unsupported(kind: UnsupportedKind, message: impl Into<String>, span: Span) -> AnalysisError {
    let construct = UnsupportedConstruct::new(kind, message, span);
    log::debug!("rejecting: {}", construct);
    AnalysisError::Unsupported(construct)
}
