//! # loopsafe - dependence analysis for C loop transformations
//!
//! Decides whether a loop transformation can be applied to a C loop
//! without changing what the program computes:
//! - access collection over a conservative C subset
//! - dependence testing with direction vectors (Fourier-Motzkin)
//! - safety checks for parallelization, interchange, fusion, distribution,
//!   strip-mining, unrolling and tiling
//!
//! ## Architecture
//!
//! ```text
//! Source → Frontend → Access Collector → Dependence Tester → Safety Check → Status
//!                         ↑                     ↑
//!                   call summary        constant propagation
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use loopsafe::prelude::*;
//!
//! let unit = loopsafe::parse(r#"
//!     void smooth(int n, double a[]) {
//!         for (int i = 1; i < n; i++)
//!             a[i] = a[i - 1] + 1;
//!     }
//! "#)?;
//! let config = AnalysisConfig::default();
//! let function = unit.function("smooth").unwrap();
//! let ctx = CheckContext::new(&unit, function, &config);
//! let selection = LoopSelection::outermost(function)[0];
//! let status = Transformation::Parallelize.check(&ctx, &selection)?;
//! assert!(status.has_error());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod frontend;
pub mod transform;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{
        analyze_dependences, DataDependence, DependenceAnalysis, DependenceAnalyzer, DependenceSummary,
        DependenceType, Direction, LinearExpr, VariableAccess,
    };
    pub use crate::config::AnalysisConfig;
    pub use crate::frontend::ast::*;
    pub use crate::transform::{CheckContext, LoopCheck, LoopSelection, Status, Transformation};
    pub use crate::utils::errors::*;
    pub use crate::utils::progress::CancellationToken;
}

use analysis::dependence::DependenceSummary;
use anyhow::{Context, Result};
use config::AnalysisConfig;
use frontend::ast::TranslationUnit;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use transform::{CheckContext, LoopSelection, Status, Transformation};
use utils::errors::{AnalysisError, AnalysisResult};

/// Main entry point for parsing source code.
pub fn parse(source: &str) -> Result<TranslationUnit> {
    frontend::parse(source).context("failed to parse C source")
}

/// Read and parse a C file.
pub fn parse_file(path: &Path) -> Result<TranslationUnit> {
    let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    frontend::parse(&source).with_context(|| format!("failed to parse {}", path.display()))
}

/// Which loops to look at and what to ask about them.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Only this function (default: every function)
    pub function: Option<String>,
    /// Only the loop at this preorder position (default: outermost loops)
    pub loop_index: Option<usize>,
    /// Transformation to check (default: report dependences only)
    pub transformation: Option<Transformation>,
}

/// Outcome for one selected loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    /// Enclosing function
    pub function: String,
    /// First line of the loop
    pub line: usize,
    /// Dependence counts; absent when only a check was requested
    pub summary: Option<DependenceSummary>,
    /// Human-readable dependences
    pub dependences: Vec<String>,
    /// Transformation checked, if any
    pub transformation: Option<Transformation>,
    /// Verdict of the check, if any
    pub status: Option<Status>,
}

impl LoopReport {
    /// Whether the requested check passed (always true for plain analysis).
    pub fn passed(&self) -> bool {
        self.status.as_ref().map_or(true, Status::is_ok)
    }
}

impl fmt::Display for LoopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function '{}', loop at line {}:", self.function, self.line)?;
        if let Some(summary) = &self.summary {
            for line in summary.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        for dep in &self.dependences {
            writeln!(f, "  {}", dep)?;
        }
        if let (Some(t), Some(status)) = (&self.transformation, &self.status) {
            writeln!(f, "  {}:", t)?;
            for line in status.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

/// Analyze or check the loops `request` selects.
///
/// In plain analysis mode a construct outside the supported subset fails
/// the whole request; a check reports it in its status instead.
pub fn run(unit: &TranslationUnit, request: &Request, config: &AnalysisConfig) -> AnalysisResult<Vec<LoopReport>> {
    let functions: Vec<_> = match &request.function {
        Some(name) => vec![unit
            .function(name)
            .ok_or_else(|| AnalysisError::invalid(format!("no function named '{}'", name)))?],
        None => unit.functions.iter().collect(),
    };

    let mut reports = Vec::new();
    for function in functions {
        let ctx = CheckContext::new(unit, function, config);
        let selections = match request.loop_index {
            Some(k) => {
                let all = LoopSelection::all(function);
                let selected = all.get(k).copied().ok_or_else(|| {
                    AnalysisError::invalid(format!(
                        "function '{}' has {} loops, no loop {}",
                        function.name,
                        all.len(),
                        k
                    ))
                })?;
                vec![selected]
            }
            None => LoopSelection::outermost(function),
        };
        log::info!("{}: {} loops selected", function.name, selections.len());

        for selection in selections {
            let stmt = selection.stmt();
            let mut report = LoopReport {
                function: function.name.clone(),
                line: stmt.span.start_line,
                summary: None,
                dependences: Vec::new(),
                transformation: request.transformation.clone(),
                status: None,
            };
            match &request.transformation {
                Some(t) => report.status = Some(t.check(&ctx, &selection)?),
                None => {
                    let analysis = ctx.analyze(std::slice::from_ref(stmt))?;
                    report.summary = Some(analysis.summary());
                    report.dependences = analysis
                        .dependences()
                        .iter()
                        .map(|d| d.description(&unit.symbols))
                        .collect();
                }
            }
            reports.push(report);
        }
    }
    Ok(reports)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
