//! Direction-vector hierarchy refinement.
//!
//! Testing every one of the `3^n` direction vectors of an `n`-deep nest is
//! wasteful when most subtrees are infeasible. The tester starts from the
//! all-`*` vector and refines the leftmost `*` into `<`, `=` and `>` only
//! while the constraint system stays feasible.

use crate::analysis::dependence::Direction;
use crate::analysis::fourier_motzkin::{ConstraintSystem, Feasibility};
use crate::utils::errors::AnalysisResult;
use crate::utils::progress::CancellationToken;

/// Dependence equations for one access pair.
///
/// `levels[k]` holds the source and sink columns of the index of the
/// `k`-th common loop, outermost first.
#[derive(Debug, Clone)]
pub struct DependenceProblem {
    /// Bounds and subscript equalities
    pub system: ConstraintSystem,
    /// (source column, sink column) per common loop
    pub levels: Vec<(usize, usize)>,
}

impl DependenceProblem {
    /// Number of common loops.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// The system restricted to the given direction vector.
    pub fn constrained(&self, directions: &[Direction]) -> ConstraintSystem {
        let mut system = self.system.clone();
        let n = system.num_vars();
        for (dir, &(s, t)) in directions.iter().zip(&self.levels) {
            // `row(a, b)` is `x_a - x_b`
            let row = |a: usize, b: usize| {
                let mut r = vec![0i64; n];
                r[a] += 1;
                r[b] -= 1;
                r
            };
            match dir {
                Direction::Lt => system.add_le(&row(s, t), -1),
                Direction::Le => system.add_le(&row(s, t), 0),
                Direction::Gt => system.add_le(&row(t, s), -1),
                Direction::Ge => system.add_le(&row(t, s), 0),
                Direction::Eq => {
                    system.add_eq(&row(s, t), 0);
                }
                Direction::Any => {}
            }
        }
        system
    }

    /// Feasibility under a direction vector.
    pub fn test(&self, directions: &[Direction]) -> Feasibility {
        let system = self.constrained(directions);
        let result = system.feasibility();
        log::trace!("direction {} -> {:?}", Direction::format_vector(directions), result);
        result
    }
}

/// Walks the refinement tree of one [`DependenceProblem`].
pub struct DirectionHierarchyTester<'a> {
    problem: &'a DependenceProblem,
    token: &'a CancellationToken,
    tests: usize,
}

impl<'a> DirectionHierarchyTester<'a> {
    /// Create a tester.
    pub fn new(problem: &'a DependenceProblem, token: &'a CancellationToken) -> Self {
        Self { problem, token, tests: 0 }
    }

    /// Number of feasibility tests run so far.
    pub fn tests_run(&self) -> usize {
        self.tests
    }

    /// Every fully refined vector that may hold a dependence.
    ///
    /// Vectors whose first non-`=` entry is `>` describe the reverse pair
    /// and are never produced. A result of [`Feasibility::Unknown`] counts
    /// as feasible.
    pub fn feasible_directions(&mut self) -> AnalysisResult<Vec<Vec<Direction>>> {
        let mut found = Vec::new();
        let mut vector = vec![Direction::Any; self.problem.depth()];
        if self.check(&vector)? {
            self.refine(&mut vector, 0, &mut found)?;
        }
        Ok(found)
    }

    fn check(&mut self, vector: &[Direction]) -> AnalysisResult<bool> {
        self.token.check()?;
        self.tests += 1;
        Ok(self.problem.test(vector).may_be_feasible())
    }

    fn refine(
        &mut self,
        vector: &mut Vec<Direction>,
        pos: usize,
        found: &mut Vec<Vec<Direction>>,
    ) -> AnalysisResult<()> {
        if pos == vector.len() {
            found.push(vector.clone());
            return Ok(());
        }
        let leading_eq = vector[..pos].iter().all(|d| *d == Direction::Eq);
        for dir in [Direction::Lt, Direction::Eq, Direction::Gt] {
            if dir == Direction::Gt && leading_eq {
                continue;
            }
            vector[pos] = dir;
            if self.check(vector)? {
                self.refine(vector, pos + 1, found)?;
            }
        }
        vector[pos] = Direction::Any;
        Ok(())
    }
}
