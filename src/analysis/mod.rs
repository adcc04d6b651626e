//! Analysis passes: access collection, dependence testing, and the
//! supporting loop, constant and linear-index models.

pub mod access;
pub mod constprop;
pub mod dependence;
pub mod fourier_motzkin;
pub mod hierarchy;
pub mod linear;
pub mod loops;
pub mod unify;

pub use access::{AccessCollector, AccessSet, CallSummary, VariableAccess, WhitelistCallSummary};
pub use constprop::{ConstEnv, ConstantPropagation};
pub use dependence::{
    DataDependence, DependenceAnalysis, DependenceAnalyzer, DependenceSummary, DependenceType, Direction,
};
pub use linear::LinearExpr;
pub use loops::CountedLoop;
pub use unify::unify_headers;

use crate::config::AnalysisConfig;
use crate::frontend::ast::{Stmt, TranslationUnit};
use crate::utils::errors::AnalysisResult;

/// Analyze a region of `function` with the default call summary and
/// constant propagation.
pub fn analyze_dependences(
    unit: &TranslationUnit,
    function: &crate::frontend::ast::Function,
    stmts: &[Stmt],
    config: &AnalysisConfig,
) -> AnalysisResult<DependenceAnalysis> {
    let calls = WhitelistCallSummary::for_function(unit, function, config);
    let constants = ConstantPropagation::for_function(function);
    DependenceAnalyzer::new(&unit.symbols, config, &calls)
        .with_constants(&constants)
        .analyze(stmts)
}
