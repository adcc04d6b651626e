//! Data dependence analysis for counted loop nests.
//!
//! Every ordered pair of accesses to the same binding with at least one
//! write is tested:
//! - pairs that can never execute in that order are skipped
//! - scalars and non-affine array pairs get `*` on every common loop
//! - affine array pairs are turned into a [`DependenceProblem`] and refined
//!   through the direction hierarchy with Fourier-Motzkin
//!
//! Variables declared inside the nest are private to the iterations of the
//! loops that enclose the declaration, so those loops never carry their
//! dependences.

use crate::analysis::access::{AccessCollector, CallSummary, VariableAccess};
use crate::analysis::constprop::{written_variables, ConstEnv, ConstantPropagation};
use crate::analysis::fourier_motzkin::ConstraintSystem;
use crate::analysis::hierarchy::{DependenceProblem, DirectionHierarchyTester};
use crate::analysis::linear::LinearExpr;
use crate::analysis::loops::CountedLoop;
use crate::config::AnalysisConfig;
use crate::frontend::ast::{LoopId, Stmt};
use crate::utils::errors::AnalysisResult;
use crate::utils::intern::{SymbolId, SymbolTable};
use crate::utils::progress::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Kind of data dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependenceType {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
    /// Read-after-read (input dependence, not a true dependence)
    Input,
}

impl DependenceType {
    /// Check if this is a "true" dependence that must be respected.
    pub fn is_true_dependence(&self) -> bool {
        !matches!(self, DependenceType::Input)
    }

    /// Get short name for the dependence kind.
    pub fn short_name(&self) -> &'static str {
        match self {
            DependenceType::Flow => "RAW",
            DependenceType::Anti => "WAR",
            DependenceType::Output => "WAW",
            DependenceType::Input => "RAR",
        }
    }
}

impl fmt::Display for DependenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependenceType::Flow => "flow",
            DependenceType::Anti => "anti",
            DependenceType::Output => "output",
            DependenceType::Input => "input",
        };
        write!(f, "{}", s)
    }
}

/// Direction of a dependence in one loop.
///
/// Directions compare the source iteration with the sink iteration: `<`
/// means the source runs in an earlier iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// < (forward dependence, positive distance)
    Lt,
    /// <= (forward or same)
    Le,
    /// = (same iteration, zero distance)
    Eq,
    /// > (backward dependence, negative distance)
    Gt,
    /// >= (backward or same)
    Ge,
    /// * (unknown/any direction)
    Any,
}

impl Direction {
    /// Get the character representation.
    pub fn to_char(&self) -> char {
        match self {
            Direction::Lt => '<',
            Direction::Le => '≤',
            Direction::Eq => '=',
            Direction::Gt => '>',
            Direction::Ge => '≥',
            Direction::Any => '*',
        }
    }

    /// Whether the source may run in an earlier iteration.
    pub fn may_be_forward(&self) -> bool {
        matches!(self, Direction::Lt | Direction::Le | Direction::Any)
    }

    /// Whether the source may run in a later iteration.
    pub fn may_be_backward(&self) -> bool {
        matches!(self, Direction::Gt | Direction::Ge | Direction::Any)
    }

    /// Whether the source may run in the same iteration.
    pub fn may_be_equal(&self) -> bool {
        !matches!(self, Direction::Lt | Direction::Gt)
    }

    /// Smallest direction admitting both.
    pub fn union(&self, other: &Direction) -> Direction {
        let forward = self.may_be_forward() || other.may_be_forward();
        let backward = self.may_be_backward() || other.may_be_backward();
        let equal = self.may_be_equal() || other.may_be_equal();
        match (forward, equal, backward) {
            (true, _, true) => Direction::Any,
            (true, true, false) => Direction::Le,
            (true, false, false) => Direction::Lt,
            (false, true, true) => Direction::Ge,
            (false, false, true) => Direction::Gt,
            (false, _, false) => Direction::Eq,
        }
    }

    /// Compute direction from a distance value.
    pub fn from_distance(dist: i64) -> Direction {
        match dist.cmp(&0) {
            std::cmp::Ordering::Less => Direction::Gt,
            std::cmp::Ordering::Equal => Direction::Eq,
            std::cmp::Ordering::Greater => Direction::Lt,
        }
    }

    /// Render a vector as `[<, =]`.
    pub fn format_vector(directions: &[Direction]) -> String {
        let items: Vec<String> = directions.iter().map(|d| d.to_char().to_string()).collect();
        format!("[{}]", items.join(", "))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// A dependence between two accesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDependence {
    /// Access that must run first
    pub source: VariableAccess,
    /// Access that must run second
    pub sink: VariableAccess,
    /// Kind of dependence
    pub kind: DependenceType,
    /// One entry per common enclosing loop, outermost first
    pub direction: Vec<Direction>,
}

impl DataDependence {
    /// Dependence from `source` to `sink` with the given direction.
    pub fn new(source: VariableAccess, sink: VariableAccess, direction: Vec<Direction>) -> Self {
        let kind = source.dependence_type_to(&sink);
        Self {
            source,
            sink,
            kind,
            direction,
        }
    }

    /// Nest depth of the loop carrying the dependence; 0 when it is not
    /// carried by any loop.
    pub fn level(&self) -> usize {
        self.direction
            .iter()
            .position(|d| *d != Direction::Eq)
            .map_or(0, |p| p + 1)
    }

    /// Check if this is a loop-carried dependence.
    pub fn is_loop_carried(&self) -> bool {
        self.level() > 0
    }

    /// Direction at a nest depth (1-based).
    pub fn direction_at(&self, level: usize) -> Option<Direction> {
        level.checked_sub(1).and_then(|k| self.direction.get(k)).copied()
    }

    /// Human-readable description naming the variable.
    pub fn description(&self, symbols: &SymbolTable) -> String {
        format!(
            "{} dependence ({}) on '{}' from line {} to line {} {}",
            self.kind,
            self.kind.short_name(),
            symbols.name(self.source.symbol),
            self.source.span.start_line,
            self.sink.span.start_line,
            Direction::format_vector(&self.direction)
        )
    }

    fn key(&self) -> (usize, usize, DependenceType, Vec<Direction>) {
        (self.source.order, self.sink.order, self.kind, self.direction.clone())
    }
}

impl fmt::Display for DataDependence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let carried = if self.is_loop_carried() {
            "Loop-carried"
        } else {
            "Loop-independent"
        };
        write!(
            f,
            "{} {} dependence from line {} to line {} {}",
            carried,
            self.kind,
            self.source.span.start_line,
            self.sink.span.start_line,
            Direction::format_vector(&self.direction)
        )
    }
}

/// Result of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct DependenceAnalysis {
    accesses: Vec<VariableAccess>,
    dependences: Vec<DataDependence>,
    loops: BTreeMap<LoopId, CountedLoop>,
}

impl DependenceAnalysis {
    /// Accesses of the analyzed region, in lexical order.
    pub fn accesses(&self) -> &[VariableAccess] {
        &self.accesses
    }

    /// Every dependence found.
    pub fn dependences(&self) -> &[DataDependence] {
        &self.dependences
    }

    /// Counted loops of the analyzed region.
    pub fn loops(&self) -> &BTreeMap<LoopId, CountedLoop> {
        &self.loops
    }

    /// Whether the outermost analyzed loop carries a flow, anti or output
    /// dependence.
    pub fn has_level1_carried_dependence(&self) -> bool {
        self.dependences_carried_at(1).next().is_some()
    }

    /// Number of loop-carried flow, anti and output dependences.
    pub fn carried_dependence_count(&self) -> usize {
        self.dependences
            .iter()
            .filter(|d| d.kind.is_true_dependence() && d.is_loop_carried())
            .count()
    }

    /// Flow, anti and output dependences carried at `level`.
    pub fn dependences_carried_at(&self, level: usize) -> impl Iterator<Item = &DataDependence> {
        self.dependences
            .iter()
            .filter(move |d| d.kind.is_true_dependence() && d.level() == level)
    }

    /// Get all dependences of a specific kind.
    pub fn dependences_of_kind(&self, kind: DependenceType) -> impl Iterator<Item = &DataDependence> {
        self.dependences.iter().filter(move |d| d.kind == kind)
    }

    /// Counts per dependence kind.
    pub fn summary(&self) -> DependenceSummary {
        let count = |kind| self.dependences_of_kind(kind).count();
        DependenceSummary {
            num_accesses: self.accesses.len(),
            num_dependences: self.dependences.len(),
            num_flow: count(DependenceType::Flow),
            num_anti: count(DependenceType::Anti),
            num_output: count(DependenceType::Output),
            num_input: count(DependenceType::Input),
            num_loop_carried: self.dependences.iter().filter(|d| d.is_loop_carried()).count(),
            num_loop_independent: self.dependences.iter().filter(|d| !d.is_loop_carried()).count(),
            max_depth: self.dependences.iter().map(|d| d.direction.len()).max().unwrap_or(0),
        }
    }
}

/// Dependence counts of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenceSummary {
    /// Accesses collected from the region
    pub num_accesses: usize,
    /// Dependences of every kind
    pub num_dependences: usize,
    /// Write then read
    pub num_flow: usize,
    /// Read then write
    pub num_anti: usize,
    /// Write then write
    pub num_output: usize,
    /// Read then read
    pub num_input: usize,
    /// Dependences carried by some loop
    pub num_loop_carried: usize,
    /// Dependences within a single iteration
    pub num_loop_independent: usize,
    /// Longest direction vector
    pub max_depth: usize,
}

impl fmt::Display for DependenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dependence Summary:")?;
        writeln!(f, "  Accesses: {}", self.num_accesses)?;
        writeln!(f, "  Total dependences: {}", self.num_dependences)?;
        writeln!(f, "    Flow (RAW): {}", self.num_flow)?;
        writeln!(f, "    Anti (WAR): {}", self.num_anti)?;
        writeln!(f, "    Output (WAW): {}", self.num_output)?;
        writeln!(f, "    Input (RAR): {}", self.num_input)?;
        writeln!(f, "  Loop-carried: {}", self.num_loop_carried)?;
        writeln!(f, "  Loop-independent: {}", self.num_loop_independent)?;
        writeln!(f, "  Max depth: {}", self.max_depth)?;
        Ok(())
    }
}

/// Runs dependence analysis over a statement region.
pub struct DependenceAnalyzer<'a> {
    symbols: &'a SymbolTable,
    config: &'a AnalysisConfig,
    calls: &'a dyn CallSummary,
    constants: Option<&'a ConstantPropagation>,
    token: CancellationToken,
}

/// Per-run state shared by every pair.
struct PairContext<'r> {
    loops: &'r BTreeMap<LoopId, CountedLoop>,
    env: ConstEnv,
    declarations: BTreeMap<SymbolId, &'r VariableAccess>,
}

impl<'a> DependenceAnalyzer<'a> {
    /// Create an analyzer.
    pub fn new(symbols: &'a SymbolTable, config: &'a AnalysisConfig, calls: &'a dyn CallSummary) -> Self {
        Self {
            symbols,
            config,
            calls,
            constants: None,
            token: CancellationToken::new(),
        }
    }

    /// Resolve bounds and symbolic subscript terms through `constants`.
    pub fn with_constants(mut self, constants: &'a ConstantPropagation) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Observe `token` during analysis.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Analyze the statements of a region.
    pub fn analyze(&self, stmts: &[Stmt]) -> AnalysisResult<DependenceAnalysis> {
        let set = AccessCollector::new(self.symbols, self.calls, self.config)
            .with_token(self.token.clone())
            .collect(stmts)?;

        let mut by_symbol: BTreeMap<SymbolId, Vec<&VariableAccess>> = BTreeMap::new();
        let mut declarations = BTreeMap::new();
        for access in &set.accesses {
            by_symbol.entry(access.symbol).or_default().push(access);
            if access.is_declaration && !access.loops.is_empty() {
                declarations.entry(access.symbol).or_insert(access);
            }
        }
        let ctx = PairContext {
            loops: &set.loops,
            env: self.region_env(stmts, &set.loops),
            declarations,
        };

        let mut dependences = Vec::new();
        let mut seen = HashSet::new();
        let mut pairs = 0usize;
        for group in by_symbol.values() {
            if group.iter().all(|a| a.is_read()) {
                continue;
            }
            for source in group {
                for sink in group {
                    if source.is_read() && sink.is_read() {
                        continue;
                    }
                    self.token.check()?;
                    pairs += 1;
                    for direction in self.directions(source, sink, &ctx)? {
                        let dep = DataDependence::new((*source).clone(), (*sink).clone(), direction);
                        if seen.insert(dep.key()) {
                            log::trace!("{}", dep.description(self.symbols));
                            dependences.push(dep);
                        }
                    }
                }
            }
        }
        log::debug!(
            "tested {} access pairs, found {} dependences",
            pairs,
            dependences.len()
        );

        Ok(DependenceAnalysis {
            accesses: set.accesses,
            dependences,
            loops: set.loops,
        })
    }

    /// Constants that hold throughout the region.
    fn region_env(&self, stmts: &[Stmt], loops: &BTreeMap<LoopId, CountedLoop>) -> ConstEnv {
        if !self.config.propagate_constants {
            return ConstEnv::empty();
        }
        let env = match (self.constants, loops.keys().next()) {
            (Some(cp), Some(first)) => cp.env_at(*first).cloned().unwrap_or_default(),
            _ => return ConstEnv::empty(),
        };
        let written: BTreeSet<SymbolId> = stmts.iter().flat_map(written_variables).collect();
        let env = env.without_all(&written);
        if !env.is_empty() {
            log::trace!("{} constants known throughout the region", env.len());
        }
        env
    }

    /// Direction vectors of every dependence from `source` to `sink`.
    fn directions(
        &self,
        source: &VariableAccess,
        sink: &VariableAccess,
        ctx: &PairContext<'_>,
    ) -> AnalysisResult<Vec<Vec<Direction>>> {
        let common = source.common_loops(sink);
        if sink.is_declaration || (common == 0 && !source.lexically_precedes(sink)) {
            return Ok(Vec::new());
        }
        let private = ctx
            .declarations
            .get(&source.symbol)
            .map_or(0, |d| source.common_loops(d).min(sink.common_loops(d)));
        let keep_same_iteration = source.order != sink.order && source.lexically_precedes(sink);

        let problem = if self.is_affine_pair(source, sink) {
            self.build_problem(source, sink, common, ctx)
        } else {
            None
        };

        let vectors = match problem {
            Some(problem) => {
                let mut tester = DirectionHierarchyTester::new(&problem, &self.token);
                let vectors = tester.feasible_directions()?;
                log::trace!("{} feasibility tests for one pair", tester.tests_run());
                vectors
                    .into_iter()
                    .filter(|v| v[..private].iter().all(|d| *d == Direction::Eq))
                    .collect()
            }
            None => {
                let mut vector = vec![Direction::Eq; private];
                vector.resize(common, Direction::Any);
                vec![vector]
            }
        };

        Ok(vectors
            .into_iter()
            .filter(|v| keep_same_iteration || v.iter().any(|d| *d != Direction::Eq))
            .collect())
    }

    fn is_affine_pair(&self, source: &VariableAccess, sink: &VariableAccess) -> bool {
        let (Some(a), Some(b)) = (source.linear_subscripts(), sink.linear_subscripts()) else {
            return false;
        };
        a.len() == b.len() && self.symbols.rank(source.symbol).map_or(true, |r| r == a.len())
    }

    /// Bounds and subscript equalities for an affine array pair.
    ///
    /// `None` when some coefficient overflows.
    fn build_problem(
        &self,
        source: &VariableAccess,
        sink: &VariableAccess,
        common: usize,
        ctx: &PairContext<'_>,
    ) -> Option<DependenceProblem> {
        let mut builder = ProblemBuilder::new(2 * common);
        let mut src_vars = BTreeMap::new();
        let mut snk_vars = BTreeMap::new();
        for (k, id) in source.loops.iter().enumerate() {
            let col = if k < common { 2 * k } else { builder.column() };
            src_vars.insert(ctx.loops.get(id)?.index, col);
        }
        for (k, id) in sink.loops.iter().enumerate() {
            let col = if k < common { 2 * k + 1 } else { builder.column() };
            snk_vars.insert(ctx.loops.get(id)?.index, col);
        }

        for (access, vars) in [(source, &src_vars), (sink, &snk_vars)] {
            for id in &access.loops {
                let counted = ctx.loops.get(id)?;
                builder.bound(counted, vars, &ctx.env)?;
            }
        }

        let src_subs = source.linear_subscripts()?;
        let snk_subs = sink.linear_subscripts()?;
        for (a, b) in src_subs.iter().zip(&snk_subs) {
            let (lhs, lc) = builder.translate(&a.fold(|s| ctx.env.get(s))?, &src_vars)?;
            let (rhs, rc) = builder.translate(&b.fold(|s| ctx.env.get(s))?, &snk_vars)?;
            let row = sub_terms(&lhs, &rhs)?;
            builder.eq.push((row, lc.checked_sub(rc)?));
        }

        Some(DependenceProblem {
            system: builder.finish()?,
            levels: (0..common).map(|k| (2 * k, 2 * k + 1)).collect(),
        })
    }
}

type Terms = BTreeMap<usize, i64>;

/// Collects rows over columns allocated on demand.
struct ProblemBuilder {
    columns: usize,
    shared: BTreeMap<SymbolId, usize>,
    /// `terms + constant <= 0`
    le: Vec<(Terms, i64)>,
    /// `terms + constant == 0`
    eq: Vec<(Terms, i64)>,
}

impl ProblemBuilder {
    fn new(columns: usize) -> Self {
        Self {
            columns,
            shared: BTreeMap::new(),
            le: Vec::new(),
            eq: Vec::new(),
        }
    }

    fn column(&mut self) -> usize {
        self.columns += 1;
        self.columns - 1
    }

    /// Map a linear expression onto columns; symbols outside `vars` are
    /// shared between both sides.
    fn translate(&mut self, expr: &LinearExpr, vars: &BTreeMap<SymbolId, usize>) -> Option<(Terms, i64)> {
        let mut terms = Terms::new();
        for (symbol, coeff) in expr.terms() {
            let col = match vars.get(&symbol) {
                Some(c) => *c,
                None => match self.shared.get(&symbol) {
                    Some(c) => *c,
                    None => {
                        let c = self.column();
                        self.shared.insert(symbol, c);
                        c
                    }
                },
            };
            let entry = terms.entry(col).or_insert(0);
            *entry = entry.checked_add(coeff)?;
        }
        Some((terms, expr.constant_term()))
    }

    /// Bounds of one loop's index column, plus a stride unknown for steps
    /// greater than one.
    fn bound(&mut self, counted: &CountedLoop, vars: &BTreeMap<SymbolId, usize>, env: &ConstEnv) -> Option<()> {
        let x = *vars.get(&counted.index)?;
        let fold = |e: Option<LinearExpr>| e.and_then(|e| e.fold(|s| env.get(s)));

        if let Some(lower) = fold(counted.lower_linear()) {
            let (terms, c) = self.translate(&lower, vars)?;
            // lower - x <= 0
            let row = sub_terms(&terms, &Terms::from([(x, 1)]))?;
            self.le.push((row, c));
            if counted.step > 1 {
                // x - lower - step*k == 0, k >= 0
                let k = self.column();
                let mut row = sub_terms(&Terms::from([(x, 1)]), &terms)?;
                row.insert(k, counted.step.checked_neg()?);
                self.eq.push((row, c.checked_neg()?));
                self.le.push((Terms::from([(k, -1)]), 0));
            }
        }
        if let Some(upper) = fold(counted.upper_linear()) {
            let (terms, c) = self.translate(&upper, vars)?;
            // x - upper <= 0
            let row = sub_terms(&Terms::from([(x, 1)]), &terms)?;
            self.le.push((row, c.checked_neg()?));
        }
        Some(())
    }

    fn finish(self) -> Option<ConstraintSystem> {
        let n = self.columns;
        let dense = |terms: &Terms| {
            let mut row = vec![0i64; n];
            for (col, c) in terms {
                row[*col] = *c;
            }
            row
        };
        let mut system = ConstraintSystem::new(n);
        for (terms, c) in &self.le {
            system.add_le(&dense(terms), c.checked_neg()?);
        }
        for (terms, c) in &self.eq {
            system.add_eq(&dense(terms), c.checked_neg()?);
        }
        Some(system)
    }
}

fn sub_terms(a: &Terms, b: &Terms) -> Option<Terms> {
    let mut out = a.clone();
    for (col, c) in b {
        let entry = out.entry(*col).or_insert(0);
        *entry = entry.checked_sub(*c)?;
    }
    out.retain(|_, c| *c != 0);
    Some(out)
}
