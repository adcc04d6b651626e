//! Loop unrolling check.
//!
//! Unrolling replicates the loop body to reduce loop overhead and enable
//! instruction-level parallelism.
//!
//! Example:
//! ```text
//! for (i = 0; i < 10; i++)
//!   a[i] = b[i] + 1;
//! ```
//! After unrolling by factor 4:
//! ```text
//! for (i = 0; i < 8; i += 4) {
//!   a[i] = b[i] + 1;
//!   a[i + 1] = b[i + 1] + 1;
//!   a[i + 2] = b[i + 2] + 1;
//!   a[i + 3] = b[i + 3] + 1;
//! }
//! // trailer for the remaining iterations
//! ```
//!
//! The trailer is sized at compile time, so both bounds must be constant.

use crate::analysis::loops::{first_unsupported_statement, writes_index, CountedLoop};
use crate::frontend::ast::{ForStmt, Stmt, StmtKind};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::{AnalysisResult, Diagnostic};

/// Checks that a loop may be unrolled.
#[derive(Debug, Clone)]
pub struct UnrollCheck<'a> {
    stmt: &'a Stmt,
    header: &'a ForStmt,
    /// Unrolling factor
    factor: i64,
}

impl<'a> UnrollCheck<'a> {
    /// Check unrolling `stmt` `factor` times.
    pub fn new(stmt: &'a Stmt, factor: i64) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            header: for_header(stmt)?,
            factor,
        })
    }

    fn is_empty_body(&self) -> bool {
        match &self.header.body.kind {
            StmtKind::Null => true,
            StmtKind::Compound(stmts) => stmts.is_empty(),
            _ => false,
        }
    }
}

impl LoopCheck for UnrollCheck<'_> {
    fn name(&self) -> &'static str {
        "unroll"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn parameter_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if self.factor <= 0 {
            status.add_fatal("Invalid loop unroll factor! (<= 0)");
        }
    }

    fn form_check(&self, ctx: &CheckContext<'_>, status: &mut Status) {
        if self.is_empty_body() {
            status.add_fatal("Loop body is empty -- nothing to unroll!");
            return;
        }
        let counted = match CountedLoop::recognize(self.header) {
            Some(c) => c,
            None => {
                status.add_fatal("Loop form not supported");
                return;
            }
        };
        if let Some(stmt) = first_unsupported_statement(self.header) {
            status.add(
                Diagnostic::fatal(format!("Loop contains unsupported statement: {}", stmt.kind.describe()))
                    .with_span(stmt.span),
            );
            return;
        }

        let env = ctx.env_at(counted.id);
        if counted.inclusive_upper_bound(&env).is_none() {
            status.add_fatal("Upper bound is not a constant value. Cannot perform unrolling!");
            return;
        }
        if counted.lower_bound(&env).is_none() {
            status.add_fatal("Lower bound is not a constant value. Cannot perform unrolling!");
            return;
        }
        if writes_index(self.header, counted.index) {
            status.add_fatal("Loop index variable is changed in the loop body. Cannot perform unrolling!");
            return;
        }

        let trips = counted.trip_count(&env).unwrap_or(0);
        log::debug!("loop at line {} runs {} times", self.stmt.span.start_line, trips);
        if self.factor > trips {
            status.add_fatal("Can't unroll loop more times than the loop runs!");
        }
    }
}
