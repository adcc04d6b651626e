//! Parallelization check.
//!
//! A loop may run its iterations in parallel when it carries no flow, anti
//! or output dependence:
//!
//! ```text
//! for (i = 1; i < n; i++)
//!   a[i] = a[i - 1] + 1;     // flow dependence carried by i: rejected
//!
//! for (i = 0; i < n; i++)
//!   a[i] = b[i] + 1;         // nothing carried: accepted
//! ```

use crate::analysis::dependence::DependenceAnalysis;
use crate::frontend::ast::{ForStmt, Stmt};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::{AnalysisResult, Diagnostic};

/// Checks that a loop may be annotated as parallel.
#[derive(Debug, Clone)]
pub struct ParallelizeCheck<'a> {
    stmt: &'a Stmt,
    header: &'a ForStmt,
}

impl<'a> ParallelizeCheck<'a> {
    /// Check the `for` statement `stmt`.
    pub fn new(stmt: &'a Stmt) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            header: for_header(stmt)?,
        })
    }

    /// The loop under test.
    pub fn header(&self) -> &'a ForStmt {
        self.header
    }
}

impl LoopCheck for ParallelizeCheck<'_> {
    fn name(&self) -> &'static str {
        "parallelize"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn form_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if !self.stmt.pragmas.is_empty() {
            status.add_fatal("When a loop has a pragma associated with it, it cannot have another pragma added to it.");
        }
    }

    fn dependence_check(
        &self,
        ctx: &CheckContext<'_>,
        analysis: &DependenceAnalysis,
        status: &mut Status,
    ) -> AnalysisResult<()> {
        if let Some(dep) = analysis.dependences_carried_at(1).next() {
            log::debug!("carried: {}", dep.description(&ctx.unit.symbols));
            status.add(
                Diagnostic::error("This loop cannot be parallelized because it carries a dependence.")
                    .with_span(dep.sink.span),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{loops, with_context};

    fn parallelize(src: &str) -> Status {
        with_context(src, |ctx| {
            let sel = loops(ctx)[0];
            ParallelizeCheck::new(sel.stmt()).unwrap().check(ctx).unwrap()
        })
    }

    #[test]
    fn test_recurrence_is_rejected() {
        let status = parallelize("void f(int n, int a[]) { for (int i = 1; i < n; i++) a[i] = a[i - 1] + 1; }");
        assert!(status.contains("This loop cannot be parallelized because it carries a dependence."));
        assert!(!status.has_fatal_error());
    }

    #[test]
    fn test_independent_iterations() {
        let status = parallelize("void f(int n, int a[], int b[]) { for (int i = 0; i < n; i++) a[i] = b[i] + 1; }");
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_private_temporary() {
        let status = parallelize(
            "void f(int n, int a[], int b[]) { for (int i = 0; i < n; i++) { int t = b[i]; a[i] = t * 2; } }",
        );
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_static_local_is_not_private() {
        let status = parallelize(
            "void f(int n, int a[]) { for (int i = 0; i < n; i++) { static int c = 0; c = c + 1; a[i] = c; } }",
        );
        assert!(status.contains("This loop cannot be parallelized because it carries a dependence."));
    }

    #[test]
    fn test_scalar_reduction_is_rejected() {
        let status = parallelize("void f(int n, int a[], int s) { for (int i = 0; i < n; i++) s += a[i]; }");
        assert!(status.has_error());
    }

    #[test]
    fn test_inner_carried_dependence_does_not_block_outer() {
        let status = parallelize(
            "void f(int n, int m, int a[100][100]) {
                for (int i = 0; i < n; i++)
                    for (int j = 1; j < m; j++)
                        a[i][j] = a[i][j - 1];
            }",
        );
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_existing_pragma_is_fatal() {
        let status = parallelize(
            "void f(int n, int a[]) {
                #pragma acc parallel loop
                for (int i = 0; i < n; i++) a[i] = 0;
            }",
        );
        assert!(status.has_fatal_error());
        assert_eq!(status.diagnostics().len(), 1);
    }

    #[test]
    fn test_unanalyzable_body_is_an_error() {
        let status = parallelize(
            "void f(int n, int a[]) { for (int i = 0; i < n; i++) { int k = 0; while (k < i) k++; a[i] = k; } }",
        );
        assert!(status.has_error());
        assert!(status.diagnostics()[0].message.starts_with("Dependences could not be analyzed"));
    }

    #[test]
    fn test_break_in_body() {
        let status = parallelize("void f(int n, int a[]) { for (int i = 0; i < n; i++) { if (a[i]) break; a[i] = 1; } }");
        assert!(status.has_error());
        assert!(status.diagnostics()[0].message.contains("break statement"));
    }
}
