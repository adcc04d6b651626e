//! Strip-mining check.
//!
//! Strip-mining splits one loop into a loop over strips and a loop over
//! the iterations of each strip:
//!
//! ```text
//! for (i = 0; i < n; i++) a[i] = 0;
//! ```
//! becomes (factor 4)
//! ```text
//! for (i_0 = 0; i_0 < n; i_0 += 4)
//!   for (i = i_0; i < i_0 + 4 && i < n; i++) a[i] = 0;
//! ```
//!
//! Iterations still run in their original order, so only the parameters
//! and the loop form need checking.

use crate::analysis::loops::CountedLoop;
use crate::frontend::ast::{ForStmt, Stmt};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::AnalysisResult;

/// Checks that a loop may be strip-mined.
#[derive(Debug, Clone)]
pub struct StripMineCheck<'a> {
    stmt: &'a Stmt,
    header: &'a ForStmt,
    factor: i64,
    new_name: Option<String>,
}

impl<'a> StripMineCheck<'a> {
    /// Check strip-mining `stmt` into strips of `factor`, optionally naming
    /// the new strip index.
    pub fn new(stmt: &'a Stmt, factor: i64, new_name: Option<String>) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            header: for_header(stmt)?,
            factor,
            new_name,
        })
    }
}

impl LoopCheck for StripMineCheck<'_> {
    fn name(&self) -> &'static str {
        "strip-mine"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn parameter_check(&self, ctx: &CheckContext<'_>, status: &mut Status) {
        if self.factor <= 0 {
            status.add_fatal("Invalid strip factor (<= 0).");
            return;
        }
        if let Some(name) = &self.new_name {
            if ctx.is_name_visible(name) {
                status.add_warning("Index variable name already exists in scope.");
            }
        }
        let step = match CountedLoop::recognize(self.header) {
            Some(counted) => counted.step,
            None => {
                status.add_fatal("Loop form not supported");
                return;
            }
        };
        if self.factor % step != 0 || self.factor <= step {
            status.add_fatal("Strip mine factor must be greater than and divisible by the intended loop's iteration factor.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{loops, with_context};

    const SIMPLE: &str = "void f(int n, int a[]) { for (int i = 0; i < n; i++) a[i] = 0; }";
    const STRIDED: &str = "void f(int n, int a[]) { for (int i = 0; i < n; i += 2) a[i] = 0; }";

    fn strip_mine(src: &str, factor: i64, new_name: Option<&str>) -> Status {
        with_context(src, |ctx| {
            let sel = loops(ctx)[0];
            StripMineCheck::new(sel.stmt(), factor, new_name.map(str::to_string))
                .unwrap()
                .check(ctx)
                .unwrap()
        })
    }

    #[test]
    fn test_valid_factor() {
        let status = strip_mine(SIMPLE, 4, Some("i_0"));
        assert!(status.is_ok(), "{}", status);
        assert!(status.diagnostics().is_empty());
    }

    #[test]
    fn test_non_positive_factor() {
        let status = strip_mine(SIMPLE, 0, None);
        assert!(status.contains("Invalid strip factor (<= 0)."));
    }

    #[test]
    fn test_factor_must_divide_step() {
        assert!(strip_mine(STRIDED, 3, None).has_fatal_error());
        assert!(strip_mine(STRIDED, 2, None).has_fatal_error());
        assert!(strip_mine(STRIDED, 4, None).is_ok());
    }

    #[test]
    fn test_existing_name_warns() {
        let status = strip_mine(SIMPLE, 4, Some("n"));
        assert!(status.is_ok());
        assert!(status.contains("Index variable name already exists in scope."));
    }

    #[test]
    fn test_uncounted_loop() {
        let status = strip_mine("void f(int n, int a[]) { for (int i = n; i > 0; i--) a[i] = 0; }", 4, None);
        assert!(status.contains("Loop form not supported"));
    }
}
