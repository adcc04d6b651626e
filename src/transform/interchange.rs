//! Loop interchange check.
//!
//! Interchange swaps two loops of a perfect nest, which can improve memory
//! access patterns or expose parallelism.
//!
//! Example:
//! ```text
//! for (i = 0; i < n; i++)
//!   for (j = 0; j < m; j++)
//!     a[i][j] = b[j][i];
//! ```
//! becomes (after interchange with depth 1):
//! ```text
//! for (j = 0; j < m; j++)
//!   for (i = 0; i < n; i++)
//!     a[i][j] = b[j][i];
//! ```
//!
//! The swap is legal when no dependence that runs forward today would run
//! backward once the two direction vector entries trade places.

use crate::analysis::dependence::{DataDependence, DependenceAnalysis, Direction};
use crate::analysis::loops::perfect_nest_headers;
use crate::frontend::ast::{ForStmt, Stmt, StmtKind};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::{AnalysisError, AnalysisResult};

/// Checks that the selected loop may be swapped with a nested loop.
#[derive(Debug, Clone)]
pub struct InterchangeCheck<'a> {
    stmt: &'a Stmt,
    outer: &'a ForStmt,
    /// Nest depth of the other loop; the selected loop is depth 0
    depth: usize,
}

impl<'a> InterchangeCheck<'a> {
    /// Check swapping `stmt` with the loop `depth` levels inside it.
    pub fn new(stmt: &'a Stmt, depth: usize) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            outer: for_header(stmt)?,
            depth,
        })
    }

    /// The loop `depth` levels inside the selected one, if any.
    pub fn inner(&self) -> Option<&'a ForStmt> {
        nested_loop_at(self.outer, self.depth)
    }
}

/// Message reported when swapping with the loop at `depth` is illegal.
pub(crate) fn interchange_error(depth: usize) -> String {
    format!(
        "Interchanging the selected loop with the loop at depth {} will change the dependence structure of the loop nest.",
        depth
    )
}

impl LoopCheck for InterchangeCheck<'_> {
    fn name(&self) -> &'static str {
        "interchange"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn parameter_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if self.depth == 0 {
            status.add_fatal("A loop cannot be interchanged with itself; the depth must be at least 1.");
            return;
        }
        if self.inner().is_none() {
            status.add_fatal(format!("There is no for-loop at exchange depth: {}", self.depth));
        }
    }

    fn form_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if perfect_nest_headers(self.outer).len() <= self.depth {
            status.add_fatal("Only perfectly nested loops can be interchanged.");
        }
    }

    fn dependence_check(
        &self,
        _ctx: &CheckContext<'_>,
        analysis: &DependenceAnalysis,
        status: &mut Status,
    ) -> AnalysisResult<()> {
        let deps = spanning(analysis, self.depth);
        if !is_interchange_valid(0, self.depth, &deps)? {
            status.add_error(interchange_error(self.depth));
        }
        Ok(())
    }
}

/// Dependences whose vectors reach down to `depth`.
pub(crate) fn spanning(analysis: &DependenceAnalysis, depth: usize) -> Vec<DataDependence> {
    analysis
        .dependences()
        .iter()
        .filter(|d| d.direction.len() > depth)
        .cloned()
        .collect()
}

/// Whether swapping nest positions `i` and `j` keeps every flow, anti and
/// output dependence running forward.
///
/// Fails with [`AnalysisError::InvalidArgument`] if a position is outside
/// some dependence's direction vector.
pub fn is_interchange_valid(i: usize, j: usize, deps: &[DataDependence]) -> AnalysisResult<bool> {
    for dep in deps {
        if !dep.kind.is_true_dependence() {
            continue;
        }
        if is_lexicographically_valid(&dep.direction) && !is_lexicographically_valid(&swap(i, j, &dep.direction)?) {
            log::debug!(
                "interchange of {} and {} reverses {}",
                i,
                j,
                Direction::format_vector(&dep.direction)
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// The first entry that is not `=` must allow the source to run first.
fn is_lexicographically_valid(dir: &[Direction]) -> bool {
    for d in dir {
        match d {
            Direction::Eq => continue,
            Direction::Lt | Direction::Le | Direction::Any => return true,
            Direction::Gt | Direction::Ge => return false,
        }
    }
    true
}

/// A copy of `dir` with positions `i` and `j` exchanged.
pub fn swap(i: usize, j: usize, dir: &[Direction]) -> AnalysisResult<Vec<Direction>> {
    if i >= dir.len() || j >= dir.len() {
        return Err(AnalysisError::invalid(format!(
            "cannot swap positions {} and {} of a direction vector of length {}",
            i,
            j,
            dir.len()
        )));
    }
    let mut result = dir.to_vec();
    result.swap(i, j);
    Ok(result)
}

/// Follow the first nested `for` of each body `depth` times.
fn nested_loop_at(outer: &ForStmt, depth: usize) -> Option<&ForStmt> {
    let mut current = outer;
    for _ in 0..depth {
        current = first_loop_in(&current.body)?;
    }
    Some(current)
}

fn first_loop_in(stmt: &Stmt) -> Option<&ForStmt> {
    match &stmt.kind {
        StmtKind::For(f) => Some(f),
        StmtKind::Compound(stmts) => stmts.iter().find_map(first_loop_in),
        StmtKind::If { then_branch, else_branch, .. } => {
            first_loop_in(then_branch).or_else(|| else_branch.as_deref().and_then(first_loop_in))
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::Switch { body, .. }
        | StmtKind::Label { body, .. } => first_loop_in(body),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::access::VariableAccess;
    use crate::transform::test_support::{loops, with_context};
    use crate::utils::intern::SymbolTable;
    use crate::utils::intern::SymbolKind;
    use crate::utils::location::Span;
    use Direction::*;

    fn access(table: &mut SymbolTable, is_write: bool, order: usize) -> VariableAccess {
        let symbol = table.declare("a", SymbolKind::Array { rank: 2 }, Span::dummy(), 1);
        VariableAccess {
            symbol,
            is_write,
            subscripts: Some(Vec::new()),
            loops: Vec::new(),
            statement: 1,
            top_level: 0,
            order,
            is_declaration: false,
            span: Span::dummy(),
        }
    }

    fn flow(direction: Vec<Direction>) -> DataDependence {
        let mut table = SymbolTable::new();
        let source = access(&mut table, true, 0);
        let sink = access(&mut table, false, 1);
        DataDependence::new(source, sink, direction)
    }

    fn interchange(src: &str, depth: usize) -> Status {
        with_context(src, |ctx| {
            let sel = loops(ctx)[0];
            InterchangeCheck::new(sel.stmt(), depth).unwrap().check(ctx).unwrap()
        })
    }

    #[test]
    fn test_interchange_legal_no_deps() {
        assert!(is_interchange_valid(0, 1, &[]).unwrap());
    }

    #[test]
    fn test_interchange_legal_forward_deps() {
        // (=, <) becomes (<, =)
        assert!(is_interchange_valid(0, 1, &[flow(vec![Eq, Lt])]).unwrap());
    }

    #[test]
    fn test_interchange_illegal() {
        // (<, >) becomes (>, <): the first entry runs backward
        assert!(!is_interchange_valid(0, 1, &[flow(vec![Lt, Gt])]).unwrap());
    }

    #[test]
    fn test_any_is_assumed_forward() {
        assert!(is_interchange_valid(0, 1, &[flow(vec![Any, Any])]).unwrap());
    }

    #[test]
    fn test_input_dependences_are_ignored() {
        let mut table = SymbolTable::new();
        let dep = DataDependence::new(access(&mut table, false, 0), access(&mut table, false, 1), vec![Lt, Gt]);
        assert!(is_interchange_valid(0, 1, &[dep]).unwrap());
    }

    #[test]
    fn test_swap_out_of_range() {
        let err = is_interchange_valid(0, 2, &[flow(vec![Lt, Gt])]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument(_)));
        assert_eq!(swap(0, 2, &[Lt, Eq, Gt]).unwrap(), vec![Gt, Eq, Lt]);
    }

    #[test]
    fn test_inner_recurrence_may_be_interchanged() {
        let status = interchange(
            "void f(int n, int m, int a[100][100]) {
                for (int i = 0; i < n; i++)
                    for (int j = 1; j < m; j++)
                        a[i][j] = a[i][j - 1];
            }",
            1,
        );
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_diagonal_dependence_blocks_interchange() {
        let status = interchange(
            "void f(int a[100][100]) {
                for (int i = 1; i < 50; i++)
                    for (int j = 0; j < 50; j++)
                        a[i][j] = a[i - 1][j + 1];
            }",
            1,
        );
        assert!(status.contains(&interchange_error(1)));
    }

    #[test]
    fn test_no_loop_at_depth() {
        let status = interchange("void f(int n, int a[]) { for (int i = 0; i < n; i++) a[i] = 0; }", 1);
        assert!(status.contains("There is no for-loop at exchange depth: 1"));
        assert!(status.has_fatal_error());
    }

    #[test]
    fn test_imperfect_nest() {
        let status = interchange(
            "void f(int n, int a[100][100], int b[]) {
                for (int i = 0; i < n; i++) {
                    b[i] = 0;
                    for (int j = 0; j < n; j++) a[i][j] = 1;
                }
            }",
            1,
        );
        assert!(status.contains("Only perfectly nested loops can be interchanged."));
    }
}
