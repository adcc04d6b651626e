//! Fourier-Motzkin feasibility testing.
//!
//! A [`ConstraintSystem`] is a conjunction of linear inequalities
//! `a1*x1 + ... + an*xn <= b` over integer unknowns. Variables are
//! eliminated one at a time; after every elimination each row is scaled to
//! integer coefficients and its right-hand side is floored, which discards
//! rational-only solutions without ever discarding an integer one.
//!
//! Equalities are kept apart from the inequalities. Those with a unit
//! coefficient are solved by exact substitution first; the rest must pass
//! the GCD test and then enter elimination as a pair of inequalities.

use num_integer::Integer;
use num_rational::Rational64;
use num_traits::{CheckedAdd, CheckedDiv, CheckedMul, Signed, Zero};
use std::fmt;

/// Largest number of rows kept alive during elimination.
pub const MAX_ROWS: usize = 4096;

/// Outcome of a feasibility test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// An integer solution may exist
    Feasible,
    /// No integer solution exists
    Infeasible,
    /// The test gave up (overflow or row blow-up)
    Unknown,
}

impl Feasibility {
    /// Whether a solution cannot be ruled out.
    pub fn may_be_feasible(&self) -> bool {
        !matches!(self, Feasibility::Infeasible)
    }
}

/// One row: `coeffs · x <= rhs`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Inequality {
    coeffs: Vec<Rational64>,
    rhs: Rational64,
}

impl Inequality {
    fn from_ints(coeffs: &[i64], rhs: i64) -> Self {
        Self {
            coeffs: coeffs.iter().map(|c| Rational64::from_integer(*c)).collect(),
            rhs: Rational64::from_integer(rhs),
        }
    }

    fn is_trivial(&self) -> bool {
        self.coeffs.iter().all(Zero::is_zero)
    }

    /// Scale to integer coefficients, divide by their gcd and floor the
    /// right-hand side.
    fn tighten(mut self) -> Option<Self> {
        let mut lcm = 1i64;
        for v in self.coeffs.iter().chain(std::iter::once(&self.rhs)) {
            let g = lcm.gcd(v.denom());
            lcm = (lcm / g).checked_mul(*v.denom())?;
        }
        let scale = Rational64::from_integer(lcm);
        let mut gcd = 0i64;
        for c in &mut self.coeffs {
            *c = c.checked_mul(&scale)?;
            gcd = gcd.gcd(c.numer());
        }
        self.rhs = self.rhs.checked_mul(&scale)?;
        if gcd > 1 {
            let g = Rational64::from_integer(gcd);
            for c in &mut self.coeffs {
                *c = c.checked_div(&g)?;
            }
            self.rhs = Rational64::from_integer(self.rhs.numer().div_floor(&gcd));
        }
        Some(self)
    }

    /// `p / |p[var]| + n / |n[var]|`, which no longer mentions `var`.
    fn combine(p: &Self, n: &Self, var: usize) -> Option<Self> {
        let wp = p.coeffs[var].abs();
        let wn = n.coeffs[var].abs();
        let mut coeffs = Vec::with_capacity(p.coeffs.len());
        for (a, b) in p.coeffs.iter().zip(&n.coeffs) {
            coeffs.push(a.checked_div(&wp)?.checked_add(&b.checked_div(&wn)?)?);
        }
        coeffs[var] = Rational64::zero();
        let rhs = p.rhs.checked_div(&wp)?.checked_add(&n.rhs.checked_div(&wn)?)?;
        Self { coeffs, rhs }.tighten()
    }
}

/// A conjunction of linear constraints over `num_vars` integer unknowns.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSystem {
    num_vars: usize,
    rows: Vec<(Vec<i64>, i64)>,
    equations: Vec<(Vec<i64>, i64)>,
}

impl ConstraintSystem {
    /// An empty system over `num_vars` unknowns.
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            rows: Vec::new(),
            equations: Vec::new(),
        }
    }

    /// Number of unknowns.
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Number of constraints, equalities included.
    pub fn len(&self) -> usize {
        self.rows.len() + self.equations.len()
    }

    /// Whether the system has no constraints.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `coeffs · x <= rhs`. Missing trailing coefficients are zero.
    pub fn add_le(&mut self, coeffs: &[i64], rhs: i64) {
        let row = self.pad(coeffs);
        self.rows.push((row, rhs));
    }

    /// Add `coeffs · x >= rhs`. Returns `false` if negation overflows.
    pub fn add_ge(&mut self, coeffs: &[i64], rhs: i64) -> bool {
        let neg: Option<Vec<i64>> = coeffs.iter().map(|c| c.checked_neg()).collect();
        match (neg, rhs.checked_neg()) {
            (Some(neg), Some(r)) => {
                self.add_le(&neg, r);
                true
            }
            _ => false,
        }
    }

    /// Add `coeffs · x == rhs`.
    pub fn add_eq(&mut self, coeffs: &[i64], rhs: i64) {
        let row = self.pad(coeffs);
        self.equations.push((row, rhs));
    }

    fn pad(&self, coeffs: &[i64]) -> Vec<i64> {
        let mut row = coeffs.to_vec();
        row.resize(self.num_vars, 0);
        row
    }

    /// Decide whether the system may have an integer solution.
    pub fn feasibility(&self) -> Feasibility {
        let mut equations = self.equations.clone();
        let mut rows = self.rows.clone();

        // Unit-coefficient equalities are solved exactly before elimination,
        // so the parity facts they carry survive into the GCD test.
        while let Some((k, var)) = unit_equation(&equations) {
            let (eq, rhs) = equations.swap_remove(k);
            for (coeffs, r) in equations.iter_mut().chain(rows.iter_mut()) {
                if substitute(coeffs, r, &eq, rhs, var).is_none() {
                    return Feasibility::Unknown;
                }
            }
        }
        if equations.iter().any(|(c, r)| !gcd_test(c, *r)) {
            return Feasibility::Infeasible;
        }

        let mut ineqs = Vec::with_capacity(rows.len() + 2 * equations.len());
        for (coeffs, rhs) in &equations {
            let neg: Option<Vec<i64>> = coeffs.iter().map(|c| c.checked_neg()).collect();
            match (neg, rhs.checked_neg()) {
                (Some(neg), Some(r)) => {
                    ineqs.push(Inequality::from_ints(coeffs, *rhs));
                    ineqs.push(Inequality::from_ints(&neg, r));
                }
                _ => return Feasibility::Unknown,
            }
        }
        ineqs.extend(rows.iter().map(|(c, r)| Inequality::from_ints(c, *r)));
        self.eliminate(ineqs)
    }

    fn eliminate(&self, ineqs: Vec<Inequality>) -> Feasibility {
        let mut rows = Vec::with_capacity(ineqs.len());
        for row in ineqs {
            match row.tighten() {
                Some(r) => rows.push(r),
                None => return Feasibility::Unknown,
            }
        }

        loop {
            let (trivial, rest): (Vec<_>, Vec<_>) = rows.into_iter().partition(Inequality::is_trivial);
            if trivial.iter().any(|r| r.rhs.is_negative()) {
                return Feasibility::Infeasible;
            }
            rows = rest;
            rows.sort();
            rows.dedup();

            let var = match self.pick_variable(&rows) {
                Some(v) => v,
                None => return Feasibility::Feasible,
            };

            let mut next = Vec::new();
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for row in rows {
                let c = row.coeffs[var];
                if c.is_positive() {
                    pos.push(row);
                } else if c.is_negative() {
                    neg.push(row);
                } else {
                    next.push(row);
                }
            }
            // A variable bounded on one side only can always be satisfied,
            // so its rows simply drop out.
            for p in &pos {
                for n in &neg {
                    match Inequality::combine(p, n, var) {
                        Some(r) => next.push(r),
                        None => return Feasibility::Unknown,
                    }
                }
                if next.len() > MAX_ROWS {
                    log::debug!("Fourier-Motzkin gave up: more than {} rows", MAX_ROWS);
                    return Feasibility::Unknown;
                }
            }
            rows = next;
        }
    }

    /// The variable whose elimination creates the fewest rows.
    fn pick_variable(&self, rows: &[Inequality]) -> Option<usize> {
        (0..self.num_vars)
            .filter_map(|v| {
                let pos = rows.iter().filter(|r| r.coeffs[v].is_positive()).count();
                let neg = rows.iter().filter(|r| r.coeffs[v].is_negative()).count();
                if pos + neg == 0 {
                    None
                } else {
                    Some((pos * neg, v))
                }
            })
            .min()
            .map(|(_, v)| v)
    }
}

/// First equation with a `±1` coefficient, and that variable.
fn unit_equation(equations: &[(Vec<i64>, i64)]) -> Option<(usize, usize)> {
    equations.iter().enumerate().find_map(|(k, (coeffs, _))| {
        coeffs.iter().position(|c| c.abs() == 1).map(|v| (k, v))
    })
}

/// Replace `x_var` in `coeffs · x (op) rhs` using `eq · x == eq_rhs`, where
/// `eq[var]` is `±1`.
fn substitute(coeffs: &mut [i64], rhs: &mut i64, eq: &[i64], eq_rhs: i64, var: usize) -> Option<()> {
    let factor = coeffs[var].checked_mul(eq[var])?;
    if factor == 0 {
        return Some(());
    }
    for (c, e) in coeffs.iter_mut().zip(eq) {
        *c = c.checked_sub(factor.checked_mul(*e)?)?;
    }
    *rhs = rhs.checked_sub(factor.checked_mul(eq_rhs)?)?;
    Some(())
}

impl fmt::Display for ConstraintSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.equations.iter().map(|r| ("==", r)).chain(self.rows.iter().map(|r| ("<=", r)));
        for (op, (coeffs, rhs)) in rows {
            let terms: Vec<String> = coeffs
                .iter()
                .enumerate()
                .filter(|(_, c)| **c != 0)
                .map(|(i, c)| format!("{}*x{}", c, i))
                .collect();
            let lhs = if terms.is_empty() { "0".to_string() } else { terms.join(" + ") };
            writeln!(f, "{} {} {}", lhs, op, rhs)?;
        }
        Ok(())
    }
}

/// GCD test for `coeffs · x == rhs`: an integer solution can exist only if
/// the gcd of the coefficients divides `rhs`.
pub fn gcd_test(coeffs: &[i64], rhs: i64) -> bool {
    let g = coeffs.iter().fold(0i64, |acc, &c| acc.gcd(&c));
    if g == 0 {
        rhs == 0
    } else {
        rhs % g == 0
    }
}
