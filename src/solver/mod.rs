//! Derivative-free nonlinear root finding for `F(x) = 0`.
//!
//! Every solver here estimates its Jacobian by forward differences and
//! stops only when `max |F(x)| < solution_tolerance` or when the residual
//! function has been called `max_evaluations` times. Reaching the budget is
//! not an error: the returned [`Solution`] reports `converged = false`.

pub mod hybrid;
pub mod newton;

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::error::{ConfigError, Result};

pub use hybrid::Hybrid;
pub use newton::Newton;

/// The residual function handed to a solver.
pub type ResidualFn<'a> = dyn FnMut(&DVector<f64>) -> Result<DVector<f64>> + 'a;

/// Trait for root finders. Implement this to plug a different algorithm
/// into the convergence loop.
pub trait RootSolver {
    fn solve(
        &self,
        f: &mut ResidualFn<'_>,
        x0: DVector<f64>,
        config: &SolverConfig,
    ) -> Result<Solution>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub enum SolverMethod {
    /// Powell dogleg trust region with Broyden updates.
    #[default]
    Hybrid,
    /// Damped Newton-Raphson with backtracking.
    Newton,
    Custom(Arc<dyn RootSolver + Send + Sync>),
}

impl SolverMethod {
    pub fn solver(&self) -> Arc<dyn RootSolver + Send + Sync> {
        match self {
            SolverMethod::Hybrid => Arc::new(Hybrid),
            SolverMethod::Newton => Arc::new(Newton),
            SolverMethod::Custom(s) => Arc::clone(s),
        }
    }
}

impl fmt::Debug for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::Hybrid => f.write_str("Hybrid"),
            SolverMethod::Newton => f.write_str("Newton"),
            SolverMethod::Custom(s) => write!(f, "Custom({})", s.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Convergence when `max |residual| < solution_tolerance`.
    pub solution_tolerance: f64,
    /// Budget of residual function calls, Jacobian columns included.
    pub max_evaluations: usize,
    /// Relative forward-difference step.
    pub finite_difference_step: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Hybrid,
            solution_tolerance: 1e-8,
            max_evaluations: 10_000,
            finite_difference_step: f64::EPSILON.sqrt(),
        }
    }
}

// ---------------------------------------------------------------------------
// Solution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Solution {
    pub x: DVector<f64>,
    /// Residual at `x`; empty when nothing was evaluated.
    pub residual: DVector<f64>,
    pub converged: bool,
    pub evaluations: usize,
    pub jacobian_evaluations: usize,
}

impl Solution {
    pub fn max_residual(&self) -> f64 {
        max_abs(&self.residual)
    }
}

pub(crate) fn max_abs(r: &DVector<f64>) -> f64 {
    if r.is_empty() {
        return f64::INFINITY;
    }
    if r.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    r.amax()
}

// ---------------------------------------------------------------------------
// Evaluation budget
// ---------------------------------------------------------------------------

/// Counts residual calls and refuses any past `max_evaluations`.
pub(crate) struct Budget<'f, 'a> {
    f: &'f mut ResidualFn<'a>,
    used: usize,
    jacobians: usize,
    max: usize,
    tolerance: f64,
}

impl<'f, 'a> Budget<'f, 'a> {
    pub(crate) fn new(f: &'f mut ResidualFn<'a>, config: &SolverConfig) -> Self {
        Self {
            f,
            used: 0,
            jacobians: 0,
            max: config.max_evaluations,
            tolerance: config.solution_tolerance,
        }
    }

    /// `Ok(None)` once the budget is spent.
    pub(crate) fn eval(&mut self, x: &DVector<f64>) -> Result<Option<DVector<f64>>> {
        if self.used >= self.max {
            return Ok(None);
        }
        self.used += 1;
        let r = (self.f)(x)?;
        if r.len() != x.len() {
            return Err(ConfigError::UnknownResidualMismatch {
                unknowns: x.len(),
                residuals: r.len(),
            }
            .into());
        }
        trace!(evaluation = self.used, max_residual = max_abs(&r), "residual evaluated");
        Ok(Some(r))
    }

    pub(crate) fn converged(&self, r: &DVector<f64>) -> bool {
        max_abs(r) < self.tolerance
    }

    pub(crate) fn finish(&self, x: DVector<f64>, residual: DVector<f64>, converged: bool) -> Solution {
        Solution {
            x,
            residual,
            converged,
            evaluations: self.used,
            jacobian_evaluations: self.jacobians,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared numerical helpers
// ---------------------------------------------------------------------------

pub(crate) enum Probe {
    Jacobian(DMatrix<f64>),
    /// A perturbed point already satisfied the tolerance.
    Solved(DVector<f64>, DVector<f64>),
    Exhausted,
}

/// Forward-difference Jacobian at `x`, one residual call per column.
///
/// Non-finite differences (a probe outside the residual's domain) enter the
/// Jacobian as zero.
pub(crate) fn forward_difference(
    budget: &mut Budget<'_, '_>,
    x: &DVector<f64>,
    fx: &DVector<f64>,
    relative_step: f64,
) -> Result<Probe> {
    let n = x.len();
    let mut jac = DMatrix::zeros(fx.len(), n);
    for j in 0..n {
        let h = relative_step * x[j].abs().max(1.0);
        let mut xp = x.clone();
        xp[j] += h;
        let Some(fp) = budget.eval(&xp)? else {
            return Ok(Probe::Exhausted);
        };
        if budget.converged(&fp) {
            return Ok(Probe::Solved(xp, fp));
        }
        let actual_h = xp[j] - x[j];
        let column = ((fp - fx) / actual_h).map(|v| if v.is_finite() { v } else { 0.0 });
        jac.set_column(j, &column);
    }
    budget.jacobians += 1;
    Ok(Probe::Jacobian(jac))
}

/// Least-squares solution of `J p = -f`; LU first, SVD when singular.
///
/// A non-finite `J` or `f` gives the zero step, which the solvers reject as
/// a failed step.
pub(crate) fn gauss_newton_step(jac: &DMatrix<f64>, f: &DVector<f64>) -> DVector<f64> {
    let finite = |v: &f64| v.is_finite();
    if !jac.iter().all(finite) || !f.iter().all(finite) {
        return DVector::zeros(jac.ncols());
    }
    let rhs = -f;
    if let Some(p) = jac.clone().lu().solve(&rhs) {
        if p.iter().all(|v| v.is_finite()) {
            return p;
        }
    }
    let svd = jac.clone().svd(true, true);
    let cutoff = 1e-12 * svd.singular_values.max().max(f64::MIN_POSITIVE);
    match svd.solve(&rhs, cutoff) {
        Ok(p) if p.iter().all(|v| v.is_finite()) => p,
        _ => DVector::zeros(jac.ncols()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use approx::assert_relative_eq;

    /// x0^2 + x1^2 = 4, x0 = x1
    fn circle(x: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(DVector::from_vec(vec![
            x[0] * x[0] + x[1] * x[1] - 4.0,
            x[0] - x[1],
        ]))
    }

    fn methods() -> Vec<SolverMethod> {
        vec![SolverMethod::Hybrid, SolverMethod::Newton]
    }

    #[test]
    fn solves_small_nonlinear_system() {
        for method in methods() {
            let config = SolverConfig {
                method: method.clone(),
                ..SolverConfig::default()
            };
            let mut f = circle;
            let sol = method
                .solver()
                .solve(&mut f, DVector::from_vec(vec![1.0, 0.5]), &config)
                .unwrap();
            assert!(sol.converged, "{method:?} did not converge");
            assert!(sol.max_residual() < 1e-8);
            assert_relative_eq!(sol.x[0], 2.0_f64.sqrt(), epsilon = 1e-7);
            assert_relative_eq!(sol.x[1], 2.0_f64.sqrt(), epsilon = 1e-7);
        }
    }

    #[test]
    fn satisfied_guess_costs_one_evaluation() {
        for method in methods() {
            let mut calls = 0;
            let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
                calls += 1;
                Ok(x * 0.0)
            };
            let sol = method
                .solver()
                .solve(&mut f, DVector::from_vec(vec![3.0, 4.0]), &SolverConfig::default())
                .unwrap();
            assert!(sol.converged);
            assert_eq!(sol.evaluations, 1);
            assert_eq!(calls, 1);
        }
    }

    #[test]
    fn constant_residual_exhausts_budget_exactly() {
        for method in methods() {
            let config = SolverConfig {
                max_evaluations: 57,
                ..SolverConfig::default()
            };
            let mut calls = 0;
            let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
                calls += 1;
                Ok(DVector::from_element(x.len(), 1.0))
            };
            let sol = method
                .solver()
                .solve(&mut f, DVector::from_vec(vec![0.0, 0.0, 0.0]), &config)
                .unwrap();
            assert!(!sol.converged);
            assert_eq!(sol.evaluations, 57);
            assert_eq!(calls, 57);
        }
    }

    #[test]
    fn mismatched_residual_length_is_fatal() {
        let mut f = |_: &DVector<f64>| -> Result<DVector<f64>> { Ok(DVector::zeros(3)) };
        let err = Hybrid
            .solve(&mut f, DVector::zeros(2), &SolverConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            SegmentError::from(ConfigError::UnknownResidualMismatch {
                unknowns: 2,
                residuals: 3
            })
        );
    }

    #[test]
    fn residual_errors_propagate() {
        let mut f = |_: &DVector<f64>| -> Result<DVector<f64>> {
            Err(SegmentError::step("physics", "boom"))
        };
        assert!(Newton
            .solve(&mut f, DVector::zeros(1), &SolverConfig::default())
            .is_err());
    }

    #[test]
    fn residual_undefined_at_the_guess_spends_the_budget() {
        for method in methods() {
            let config = SolverConfig {
                max_evaluations: 50,
                ..SolverConfig::default()
            };
            // sqrt is NaN for the negative half of x0
            let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
                Ok(DVector::from_vec(vec![x[0].sqrt() - 1.0, x[1] - 2.0]))
            };
            let sol = method
                .solver()
                .solve(&mut f, DVector::from_vec(vec![-1.0, 0.0]), &config)
                .unwrap();
            assert!(!sol.converged, "{method:?} reported convergence");
            assert_eq!(sol.evaluations, 50);
        }
    }

    #[test]
    fn undefined_probes_do_not_poison_the_jacobian() {
        let config = SolverConfig {
            max_evaluations: 10,
            ..SolverConfig::default()
        };
        let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_vec(vec![if x[0] > 0.0 { f64::NAN } else { x[0] + 1.0 }]))
        };
        let mut budget = Budget::new(&mut f, &config);
        let x = DVector::from_vec(vec![0.0]);
        let fx = DVector::from_vec(vec![1.0]);
        match forward_difference(&mut budget, &x, &fx, 1e-6).unwrap() {
            Probe::Jacobian(j) => assert_eq!(j[(0, 0)], 0.0),
            _ => panic!("expected a Jacobian"),
        }
    }

    #[test]
    fn non_finite_system_gives_zero_step() {
        let jac = DMatrix::from_row_slice(2, 2, &[f64::NAN, 1.0, 0.0, 1.0]);
        let f = DVector::from_vec(vec![1.0, 1.0]);
        assert_eq!(gauss_newton_step(&jac, &f), DVector::zeros(2));

        let jac = DMatrix::identity(2, 2);
        let f = DVector::from_vec(vec![f64::INFINITY, 1.0]);
        assert_eq!(gauss_newton_step(&jac, &f), DVector::zeros(2));
    }

    #[test]
    fn singular_jacobian_falls_back_to_least_squares() {
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let f = DVector::from_vec(vec![2.0, 2.0]);
        let p = gauss_newton_step(&jac, &f);
        assert_relative_eq!(p[0], -1.0, epsilon = 1e-10);
        assert_relative_eq!(p[1], -1.0, epsilon = 1e-10);
    }
}
