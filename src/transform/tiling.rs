//! Loop tiling check.
//!
//! Tiling (also called blocking) transforms a loop nest to improve cache
//! locality by processing data in smaller blocks that fit in cache.
//!
//! Example:
//! ```text
//! for (i = 0; i < n; i++)
//!   for (j = 0; j < m; j++)
//!     a[i][j] = ...;
//! ```
//! becomes:
//! ```text
//! for (ii = 0; ii < n; ii += height)
//!   for (jj = 0; jj < m; jj += width)
//!     for (i = ii; i < min(ii + height, n); i++)
//!       for (j = jj; j < min(jj + width, m); j++)
//!         a[i][j] = ...;
//! ```
//!
//! Within a tile the two loops run in swapped order relative to the tile
//! loops, so the dependence test is the interchange test of the two loops.
//! That is slightly conservative: a dependence long enough to always reach
//! a previous tile would not block tiling.

use crate::analysis::dependence::DependenceAnalysis;
use crate::analysis::loops::perfect_nest_headers;
use crate::frontend::ast::{ForStmt, Stmt};
use crate::transform::interchange::{interchange_error, is_interchange_valid, spanning};
use crate::transform::{for_header, CheckContext, LoopCheck, Status};
use crate::utils::errors::AnalysisResult;

/// Checks that a two-deep perfect nest may be tiled.
#[derive(Debug, Clone)]
pub struct TileCheck<'a> {
    stmt: &'a Stmt,
    outer: &'a ForStmt,
    /// Tile size along the inner loop
    width: i64,
    /// Tile size along the outer loop
    height: i64,
}

impl<'a> TileCheck<'a> {
    /// Check tiling the nest rooted at `stmt` with `height x width` tiles.
    pub fn new(stmt: &'a Stmt, width: i64, height: i64) -> AnalysisResult<Self> {
        Ok(Self {
            stmt,
            outer: for_header(stmt)?,
            width,
            height,
        })
    }

    /// The tiled inner loop, once the nest is known to be deep enough.
    pub fn inner(&self) -> Option<&'a ForStmt> {
        perfect_nest_headers(self.outer).get(1).copied()
    }
}

impl LoopCheck for TileCheck<'_> {
    fn name(&self) -> &'static str {
        "tile"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.stmt
    }

    fn parameter_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if self.height < 1 {
            status.add_fatal("Height must be at least 1");
            return;
        }
        if self.width < 1 {
            status.add_fatal("Width must be at least 1");
        }
    }

    fn form_check(&self, _ctx: &CheckContext<'_>, status: &mut Status) {
        if !self.stmt.pragmas.is_empty() {
            status.add_error("This loop has a pragma associated with it.");
        }
        if self.inner().is_none() {
            status.add_fatal("There must be two nested loops to perform loop tiling.");
        }
    }

    fn dependence_check(
        &self,
        _ctx: &CheckContext<'_>,
        analysis: &DependenceAnalysis,
        status: &mut Status,
    ) -> AnalysisResult<()> {
        if !is_interchange_valid(0, 1, &spanning(analysis, 1))? {
            status.add_error(interchange_error(1));
        }
        Ok(())
    }
}
