use nalgebra::DVector;

use super::{
    forward_difference, gauss_newton_step, Budget, Probe, ResidualFn, RootSolver, Solution,
    SolverConfig,
};
use crate::error::Result;

/// Damped Newton-Raphson: `x_{k+1} = x_k + lambda * dx`, with `J dx = -F`.
///
/// The Jacobian is re-estimated by forward differences every iteration.
/// `lambda` halves until `||F||` decreases; below `MIN_DAMPING` the step is
/// abandoned and the Jacobian rebuilt at the unchanged point.
#[derive(Debug, Clone, Copy, Default)]
pub struct Newton;

const MIN_DAMPING: f64 = 1.0 / 1024.0;

impl RootSolver for Newton {
    fn solve(
        &self,
        f: &mut ResidualFn<'_>,
        x0: DVector<f64>,
        config: &SolverConfig,
    ) -> Result<Solution> {
        let mut budget = Budget::new(f, config);
        let mut x = x0;

        let Some(mut fx) = budget.eval(&x)? else {
            return Ok(budget.finish(x, DVector::zeros(0), false));
        };
        if budget.converged(&fx) {
            return Ok(budget.finish(x, fx, true));
        }

        loop {
            let step = config.finite_difference_step;
            let jac = match forward_difference(&mut budget, &x, &fx, step)? {
                Probe::Jacobian(j) => j,
                Probe::Solved(xs, fs) => return Ok(budget.finish(xs, fs, true)),
                Probe::Exhausted => break,
            };
            let dx = gauss_newton_step(&jac, &fx);
            let fnorm = fx.norm();

            let mut lambda = 1.0;
            while lambda >= MIN_DAMPING {
                let x_trial = &x + &dx * lambda;
                let Some(f_trial) = budget.eval(&x_trial)? else {
                    return Ok(budget.finish(x, fx, false));
                };
                if budget.converged(&f_trial) {
                    return Ok(budget.finish(x_trial, f_trial, true));
                }
                if f_trial.norm() < fnorm {
                    x = x_trial;
                    fx = f_trial;
                    break;
                }
                lambda *= 0.5;
            }
        }

        Ok(budget.finish(x, fx, false))
    }

    fn name(&self) -> &str {
        "newton"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_system_solves_with_one_jacobian() {
        let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_vec(vec![2.0 * x[0] - 4.0, x[0] + x[1] - 3.0]))
        };
        let sol = Newton
            .solve(&mut f, DVector::zeros(2), &SolverConfig::default())
            .unwrap();
        assert!(sol.converged);
        assert!(sol.jacobian_evaluations <= 2);
        assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(sol.x[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn damping_recovers_from_overshoot() {
        // atan has a shallow slope far from the root; full steps overshoot
        let mut f = |x: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_vec(vec![x[0].atan()]))
        };
        let sol = Newton
            .solve(&mut f, DVector::from_vec(vec![3.0]), &SolverConfig::default())
            .unwrap();
        assert!(sol.converged);
        assert!(sol.x[0].abs() < 1e-8);
    }
}
