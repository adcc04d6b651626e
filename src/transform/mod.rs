//! Safety checks for loop transformations.
//!
//! A check never rewrites anything. It answers whether a transformation may
//! be applied to a selected loop without changing what the program
//! computes, and explains why not when it may not:
//!
//! ```text
//! parameter check -> loop form check -> dependence check
//! ```
//!
//! A fatal diagnostic stops the pipeline, so dependence analysis only runs
//! on loops whose shape the transformation accepts. Errors accumulate:
//! every reason a transformation is blocked ends up in the same [`Status`].

pub mod fission;
pub mod fusion;
pub mod interchange;
pub mod parallel;
pub mod strip_mine;
pub mod tiling;
pub mod unroll;

pub use fission::DistributeCheck;
pub use fusion::FusionCheck;
pub use interchange::{is_interchange_valid, InterchangeCheck};
pub use parallel::ParallelizeCheck;
pub use strip_mine::StripMineCheck;
pub use tiling::TileCheck;
pub use unroll::UnrollCheck;

use crate::analysis::access::WhitelistCallSummary;
use crate::analysis::constprop::{ConstEnv, ConstantPropagation};
use crate::analysis::dependence::{DependenceAnalysis, DependenceAnalyzer};
use crate::analysis::loops::first_unsupported_op;
use crate::config::AnalysisConfig;
use crate::frontend::ast::{referenced_symbols, ForStmt, Function, LoopId, Stmt, StmtKind, TranslationUnit};
use crate::utils::errors::{AnalysisError, AnalysisResult, Diagnostic, Severity};
use crate::utils::progress::CancellationToken;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Diagnostics produced by one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    diagnostics: Vec<Diagnostic>,
}

impl Status {
    /// An empty status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        log::debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Record a fatal error.
    pub fn add_fatal(&mut self, message: impl Into<String>) {
        self.add(Diagnostic::fatal(message));
    }

    /// Record an error.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Diagnostic::error(message));
    }

    /// Record a warning.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(Diagnostic::warning(message));
    }

    /// Every diagnostic, in the order recorded.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// No errors and no fatal errors; warnings are allowed.
    pub fn is_ok(&self) -> bool {
        !self.has_error()
    }

    /// At least one error or fatal error.
    pub fn has_error(&self) -> bool {
        self.severity() >= Some(Severity::Error)
    }

    /// At least one fatal error.
    pub fn has_fatal_error(&self) -> bool {
        self.severity() == Some(Severity::Fatal)
    }

    /// Most severe diagnostic, if any.
    pub fn severity(&self) -> Option<Severity> {
        self.diagnostics.iter().map(|d| d.severity).max()
    }

    /// Whether some diagnostic has exactly this message.
    pub fn contains(&self, message: &str) -> bool {
        self.diagnostics.iter().any(|d| d.message == message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return write!(f, "ok");
        }
        for (k, d) in self.diagnostics.iter().enumerate() {
            if k > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

/// Everything a check needs to know about the function it runs in.
pub struct CheckContext<'a> {
    /// Translation unit holding the function
    pub unit: &'a TranslationUnit,
    /// Function containing the selected loop
    pub function: &'a Function,
    /// Analysis knobs
    pub config: &'a AnalysisConfig,
    calls: WhitelistCallSummary,
    constants: ConstantPropagation,
    token: CancellationToken,
}

impl<'a> CheckContext<'a> {
    /// Build the call summary and constant propagation for `function`.
    pub fn new(unit: &'a TranslationUnit, function: &'a Function, config: &'a AnalysisConfig) -> Self {
        Self {
            unit,
            function,
            config,
            calls: WhitelistCallSummary::for_function(unit, function, config),
            constants: ConstantPropagation::for_function(function),
            token: CancellationToken::new(),
        }
    }

    /// Observe `token` in every analysis run through this context.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Cancellation token shared with the analyses.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Analyze the dependences of a statement region.
    pub fn analyze(&self, stmts: &[Stmt]) -> AnalysisResult<DependenceAnalysis> {
        DependenceAnalyzer::new(&self.unit.symbols, self.config, &self.calls)
            .with_constants(&self.constants)
            .with_token(self.token.clone())
            .analyze(stmts)
    }

    /// Constants known on every iteration of a loop.
    pub fn env_at(&self, id: LoopId) -> ConstEnv {
        if !self.config.propagate_constants {
            return ConstEnv::empty();
        }
        self.constants.env_at(id).cloned().unwrap_or_default()
    }

    /// Whether `name` is declared at file scope or anywhere in the function.
    pub fn is_name_visible(&self, name: &str) -> bool {
        let symbols = &self.unit.symbols;
        let in_function = self
            .function
            .params
            .iter()
            .map(|p| p.symbol)
            .chain(referenced_symbols(&self.function.body))
            .any(|s| symbols.name(s) == name);
        in_function
            || self
                .unit
                .globals
                .iter()
                .flat_map(referenced_symbols)
                .any(|s| symbols.name(s) == name)
    }
}

/// A check of one transformation on one selected loop.
pub trait LoopCheck {
    /// Transformation name, for logs and reports.
    fn name(&self) -> &'static str;

    /// The selected `for` statement.
    fn loop_stmt(&self) -> &Stmt;

    /// Validate the transformation's parameters.
    fn parameter_check(&self, _ctx: &CheckContext<'_>, _status: &mut Status) {}

    /// Validate the shape of the loop.
    fn form_check(&self, _ctx: &CheckContext<'_>, _status: &mut Status) {}

    /// Statements whose dependences decide the check. The selected loop
    /// itself by default, so that it is the level-1 loop of the analysis.
    fn dependence_region(&self) -> Cow<'_, [Stmt]> {
        Cow::Borrowed(std::slice::from_ref(self.loop_stmt()))
    }

    /// Inspect the dependences of [`LoopCheck::dependence_region`].
    fn dependence_check(
        &self,
        _ctx: &CheckContext<'_>,
        _analysis: &DependenceAnalysis,
        _status: &mut Status,
    ) -> AnalysisResult<()> {
        Ok(())
    }

    /// Run the whole pipeline.
    ///
    /// Cancellation and caller contract violations are returned as `Err`;
    /// everything else ends up in the status.
    fn check(&self, ctx: &CheckContext<'_>) -> AnalysisResult<Status> {
        ctx.token().check()?;
        let mut status = Status::new();
        self.parameter_check(ctx, &mut status);
        if !status.has_fatal_error() {
            body_op_check(self.loop_stmt(), &mut status);
            self.form_check(ctx, &mut status);
        }
        if !status.has_fatal_error() {
            let region = self.dependence_region();
            if let Some(analysis) = analyze_or_report(ctx, &region, &mut status)? {
                self.dependence_check(ctx, &analysis, &mut status)?;
            }
        }
        let line = self.loop_stmt().span.start_line;
        if status.is_ok() {
            log::info!("{} check passed for loop at line {}", self.name(), line);
        } else {
            log::info!(
                "{} check failed for loop at line {} with {} diagnostics",
                self.name(),
                line,
                status.diagnostics().len()
            );
        }
        Ok(status)
    }
}

/// Analyze `region`, turning a refusal to analyze into an error diagnostic.
pub(crate) fn analyze_or_report(
    ctx: &CheckContext<'_>,
    region: &[Stmt],
    status: &mut Status,
) -> AnalysisResult<Option<DependenceAnalysis>> {
    match ctx.analyze(region) {
        Ok(analysis) => Ok(Some(analysis)),
        Err(AnalysisError::Unsupported(u)) => {
            log::debug!("dependence analysis refused: {}", u);
            status.add(Diagnostic::error(format!("Dependences could not be analyzed: {}", u.message)).with_span(u.span));
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Control transfers out of the body make every transformation unsafe.
fn body_op_check(stmt: &Stmt, status: &mut Status) {
    let body = match &stmt.kind {
        StmtKind::For(f) => &f.body,
        _ => return,
    };
    if let Some(op) = first_unsupported_op(body) {
        status.add(
            Diagnostic::error(format!(
                "Cannot refactor: the loop body contains a {}.",
                op.kind.describe()
            ))
            .with_span(op.span),
        );
    }
}

/// The `for` payload of a selected statement.
pub(crate) fn for_header(stmt: &Stmt) -> AnalysisResult<&ForStmt> {
    stmt.as_for().ok_or_else(|| {
        AnalysisError::invalid(format!(
            "selected {} at line {} is not a for loop",
            stmt.kind.describe(),
            stmt.span.start_line
        ))
    })
}

/// A `for` statement together with the statement list it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct LoopSelection<'a> {
    /// Statements of the enclosing block
    pub siblings: &'a [Stmt],
    /// Position of the loop among `siblings`
    pub index: usize,
    /// Number of enclosing `for` loops
    pub depth: usize,
}

impl<'a> LoopSelection<'a> {
    /// The selected statement.
    pub fn stmt(&self) -> &'a Stmt {
        &self.siblings[self.index]
    }

    /// The selected loop header and body.
    pub fn for_stmt(&self) -> AnalysisResult<&'a ForStmt> {
        for_header(self.stmt())
    }

    /// The statement right after the loop in the same block.
    pub fn next_sibling(&self) -> Option<&'a Stmt> {
        self.siblings.get(self.index + 1)
    }

    /// Every `for` statement of `function`, in preorder.
    pub fn all(function: &'a Function) -> Vec<LoopSelection<'a>> {
        let mut found = Vec::new();
        collect_loops(function.statements(), 0, &mut found);
        found
    }

    /// The loops of `function` that are not nested in another loop.
    pub fn outermost(function: &'a Function) -> Vec<LoopSelection<'a>> {
        Self::all(function).into_iter().filter(|s| s.depth == 0).collect()
    }
}

fn collect_loops<'a>(stmts: &'a [Stmt], depth: usize, found: &mut Vec<LoopSelection<'a>>) {
    for (index, stmt) in stmts.iter().enumerate() {
        match &stmt.kind {
            StmtKind::For(f) => {
                found.push(LoopSelection {
                    siblings: stmts,
                    index,
                    depth,
                });
                collect_loops(f.body.statements(), depth + 1, found);
            }
            StmtKind::Compound(inner) => collect_loops(inner, depth, found),
            StmtKind::If { then_branch, else_branch, .. } => {
                collect_loops(then_branch.statements(), depth, found);
                if let Some(e) = else_branch {
                    collect_loops(e.statements(), depth, found);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::Switch { body, .. }
            | StmtKind::Label { body, .. } => collect_loops(body.statements(), depth, found),
            _ => {}
        }
    }
}

/// A transformation request with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transformation", rename_all = "kebab-case")]
pub enum Transformation {
    /// Annotate the loop as parallel
    Parallelize,
    /// Swap the loop with the perfectly nested loop at `depth`
    Interchange {
        /// Nest depth of the other loop (the selected loop is depth 0)
        depth: usize,
    },
    /// Fuse the loop with the loop that follows it
    Fuse,
    /// Split the loop into one loop per body statement
    Distribute,
    /// Strip-mine the loop into strips of `factor` iterations
    StripMine {
        /// Strip size
        factor: i64,
        /// Name of the new strip index
        new_name: Option<String>,
    },
    /// Unroll the loop `factor` times
    Unroll {
        /// Unroll factor
        factor: i64,
    },
    /// Tile a two-deep perfect nest
    Tile {
        /// Tile width (inner loop)
        width: i64,
        /// Tile height (outer loop)
        height: i64,
    },
}

impl Transformation {
    /// Short name of the transformation.
    pub fn name(&self) -> &'static str {
        match self {
            Transformation::Parallelize => "parallelize",
            Transformation::Interchange { .. } => "interchange",
            Transformation::Fuse => "fuse",
            Transformation::Distribute => "distribute",
            Transformation::StripMine { .. } => "strip-mine",
            Transformation::Unroll { .. } => "unroll",
            Transformation::Tile { .. } => "tile",
        }
    }

    /// Run the matching check on a selected loop.
    pub fn check(&self, ctx: &CheckContext<'_>, selection: &LoopSelection<'_>) -> AnalysisResult<Status> {
        let stmt = selection.stmt();
        match self {
            Transformation::Parallelize => ParallelizeCheck::new(stmt)?.check(ctx),
            Transformation::Interchange { depth } => InterchangeCheck::new(stmt, *depth)?.check(ctx),
            Transformation::Fuse => FusionCheck::new(selection)?.check(ctx),
            Transformation::Distribute => DistributeCheck::new(stmt)?.check(ctx),
            Transformation::StripMine { factor, new_name } => {
                StripMineCheck::new(stmt, *factor, new_name.clone())?.check(ctx)
            }
            Transformation::Unroll { factor } => UnrollCheck::new(stmt, *factor)?.check(ctx),
            Transformation::Tile { width, height } => TileCheck::new(stmt, *width, *height)?.check(ctx),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transformation::Interchange { depth } => write!(f, "interchange (depth {})", depth),
            Transformation::StripMine { factor, .. } => write!(f, "strip-mine (factor {})", factor),
            Transformation::Unroll { factor } => write!(f, "unroll (factor {})", factor),
            Transformation::Tile { width, height } => write!(f, "tile ({}x{})", height, width),
            other => write!(f, "{}", other.name()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_status_severity() {
        let mut status = Status::new();
        assert!(status.is_ok());
        assert_eq!(status.to_string(), "ok");
        status.add_warning("name already exists");
        assert!(status.is_ok());
        status.add_error("carries a dependence");
        assert!(status.has_error());
        assert!(!status.has_fatal_error());
        status.add_fatal("not a loop");
        assert!(status.has_fatal_error());
        assert_eq!(status.severity(), Some(Severity::Fatal));
        assert!(status.contains("carries a dependence"));
        assert_eq!(status.to_string().lines().count(), 3);
    }

    #[test]
    fn test_loop_selection_preorder() {
        let src = "void f(int n, int a[10][10], int b[]) {
            for (int i = 0; i < n; i++)
                for (int j = 0; j < 10; j++)
                    a[i][j] = 0;
            if (n > 0) {
                for (int k = 0; k < n; k++) b[k] = 1;
            }
        }";
        with_context(src, |ctx| {
            let all = LoopSelection::all(ctx.function);
            assert_eq!(all.iter().map(|s| s.depth).collect::<Vec<_>>(), vec![0, 1, 0]);
            assert_eq!(loops(ctx).len(), 2);
            assert!(all[0].next_sibling().is_some());
            assert!(all[1].next_sibling().is_none());
        });
    }

    #[test]
    fn test_transformation_dispatch() {
        let src = "void f(int n, int a[]) { for (int i = 1; i < n; i++) a[i] = a[i - 1] + 1; }";
        with_context(src, |ctx| {
            let sel = loops(ctx)[0];
            let status = Transformation::Parallelize.check(ctx, &sel).unwrap();
            assert!(status.has_error());
            let status = Transformation::Unroll { factor: 0 }.check(ctx, &sel).unwrap();
            assert!(status.has_fatal_error());
        });
    }

    #[test]
    fn test_non_loop_selection_is_invalid() {
        let src = "void f(int x) { x = 1; }";
        with_context(src, |ctx| {
            let sel = LoopSelection {
                siblings: ctx.function.statements(),
                index: 0,
                depth: 0,
            };
            let err = Transformation::Parallelize.check(ctx, &sel).unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidArgument(_)));
        });
    }

    #[test]
    fn test_cancelled_check() {
        let src = "void f(int n, int a[]) { for (int i = 0; i < n; i++) a[i] = 0; }";
        with_context(src, |ctx| {
            let token = CancellationToken::new();
            token.cancel();
            let unit = ctx.unit;
            let ctx = CheckContext::new(unit, ctx.function, ctx.config).with_token(token);
            let sel = loops(&ctx)[0];
            let err = Transformation::Parallelize.check(&ctx, &sel).unwrap_err();
            assert!(err.is_cancelled());
        });
    }

    #[test]
    fn test_name_visibility() {
        let src = "int g; void f(int n, int a[]) { int t; for (int i = 0; i < n; i++) a[i] = t; }";
        with_context(src, |ctx| {
            for name in ["g", "n", "t", "i"] {
                assert!(ctx.is_name_visible(name), "{}", name);
            }
            assert!(!ctx.is_name_visible("ii"));
        });
    }
}
