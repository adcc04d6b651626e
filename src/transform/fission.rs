//! Loop distribution (fission) check.
//!
//! Distribution splits a loop into one loop per body statement, the
//! opposite of fusion:
//!
//! ```text
//! for (i = 1; i < n; i++) { a[i] = b[i]; c[i] = a[i - 1]; }
//! ```
//! becomes
//! ```text
//! for (i = 1; i < n; i++) a[i] = b[i];
//! for (i = 1; i < n; i++) c[i] = a[i - 1];
//! ```
//!
//! After the split every instance of an earlier statement runs before
//! every instance of a later one, so a dependence the loop carries from a
//! later statement back to an earlier one would be reversed.

use crate::analysis::dependence::{DataDependence, DependenceAnalysis};
use crate::frontend::ast::{ForStmt, Stmt, StmtKind};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::{AnalysisResult, Diagnostic};

/// Checks that a loop may be distributed over its body statements.
#[derive(Debug, Clone)]
pub struct DistributeCheck<'a> {
    stmt: &'a Stmt,
    header: &'a ForStmt,
}

impl<'a> DistributeCheck<'a> {
    /// Check the `for` statement `stmt`.
    pub fn new(stmt: &'a Stmt) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            header: for_header(stmt)?,
        })
    }
}

/// Carried at the distributed loop, from a later statement to an earlier one.
fn prevents_distribution(dep: &DataDependence) -> bool {
    dep.kind.is_true_dependence()
        && dep.level() == 1
        && dep.direction_at(1).map_or(false, |d| d.may_be_forward())
        && dep.source.top_level > dep.sink.top_level
}

impl LoopCheck for DistributeCheck<'_> {
    fn name(&self) -> &'static str {
        "distribute"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn form_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        let stmts = match &self.header.body.kind {
            StmtKind::Compound(stmts) => stmts,
            _ => {
                status.add_fatal("Loop body is not a compound statement, so distribution cannot be performed.");
                return;
            }
        };
        if stmts.len() < 2 {
            status.add_fatal(
                "Loop distribution can only be applied if there is more than one statement in the loop body.",
            );
        }
    }

    fn dependence_check(
        &self,
        ctx: &CheckContext<'_>,
        analysis: &DependenceAnalysis,
        status: &mut Status,
    ) -> AnalysisResult<()> {
        if let Some(dep) = analysis.dependences().iter().find(|d| prevents_distribution(d)) {
            log::debug!("distribution-preventing: {}", dep.description(&ctx.unit.symbols));
            status.add(
                Diagnostic::error("Distribution cannot be performed because the loop carries a dependence.")
                    .with_span(dep.source.span),
            );
        }
        Ok(())
    }
}
