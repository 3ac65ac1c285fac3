use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{
    forward_difference, gauss_newton_step, Budget, Probe, ResidualFn, RootSolver, Solution,
    SolverConfig,
};
use crate::error::Result;

/// Powell's hybrid method: a dogleg step inside a trust region, with the
/// forward-difference Jacobian kept current by Broyden rank-1 updates.
///
/// The Jacobian is re-estimated after two consecutive failed steps or when
/// the trust region collapses. Only the convergence predicate or the
/// evaluation budget ends the iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hybrid;

const INITIAL_RADIUS_FACTOR: f64 = 100.0;

impl RootSolver for Hybrid {
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

        let step = config.finite_difference_step;
        let mut jac = match forward_difference(&mut budget, &x, &fx, step)? {
            Probe::Jacobian(j) => j,
            Probe::Solved(xs, fs) => return Ok(budget.finish(xs, fs, true)),
            Probe::Exhausted => return Ok(budget.finish(x, fx, false)),
        };

        let mut delta = initial_radius(&x);
        let mut failures = 0_u32;
        let mut successes = 0_u32;

        loop {
            let p = dogleg(&jac, &fx, delta);
            let pnorm = p.norm();
            let x_trial = &x + &p;
            let Some(f_trial) = budget.eval(&x_trial)? else {
                break;
            };
            if budget.converged(&f_trial) {
                return Ok(budget.finish(x_trial, f_trial, true));
            }

            // Actual versus predicted reduction of ||F||.
            let fnorm = fx.norm();
            let predicted = fnorm - (&fx + &jac * &p).norm();
            let actual = fnorm - f_trial.norm();
            let ratio = if predicted > 0.0 && actual.is_finite() {
                actual / predicted
            } else {
                0.0
            };

            if ratio < 0.1 {
                failures += 1;
                successes = 0;
                delta = 0.5 * delta.min(pnorm);
            } else {
                failures = 0;
                successes += 1;
                if ratio >= 0.5 || successes > 1 {
                    delta = delta.max(2.0 * pnorm);
                }
                if (ratio - 1.0).abs() <= 0.1 {
                    delta = 2.0 * pnorm;
                }
            }

            if pnorm > 0.0 && f_trial.iter().all(|v| v.is_finite()) {
                broyden_update(&mut jac, &fx, &f_trial, &p);
            }

            if ratio >= 1e-4 {
                x = x_trial;
                fx = f_trial;
            }

            let collapsed = delta <= f64::EPSILON * x.norm().max(1.0);
            if failures >= 2 || collapsed {
                debug!(failures, delta, "refreshing finite-difference Jacobian");
                jac = match forward_difference(&mut budget, &x, &fx, step)? {
                    Probe::Jacobian(j) => j,
                    Probe::Solved(xs, fs) => return Ok(budget.finish(xs, fs, true)),
                    Probe::Exhausted => break,
                };
                failures = 0;
                if collapsed {
                    delta = initial_radius(&x);
                }
            }
        }

        Ok(budget.finish(x, fx, false))
    }

    fn name(&self) -> &str {
        "hybrid"
    }
}

fn initial_radius(x: &DVector<f64>) -> f64 {
    let norm = x.norm();
    if norm > 0.0 {
        INITIAL_RADIUS_FACTOR * norm
    } else {
        INITIAL_RADIUS_FACTOR
    }
}

/// Dogleg step of length at most `delta` between steepest descent and the
/// Gauss-Newton step.
fn dogleg(jac: &DMatrix<f64>, f: &DVector<f64>, delta: f64) -> DVector<f64> {
    let gn = gauss_newton_step(jac, f);
    let gn_norm = gn.norm();
    if gn_norm <= delta {
        return gn;
    }

    let g = jac.transpose() * f;
    let g_norm = g.norm();
    if g_norm == 0.0 {
        return gn * (delta / gn_norm);
    }

    let jg = jac * &g;
    let jg_sq = jg.norm_squared();
    if jg_sq == 0.0 {
        return g * (-delta / g_norm);
    }

    let sd = &g * (-(g_norm * g_norm) / jg_sq);
    let sd_norm = sd.norm();
    if sd_norm >= delta {
        return g * (-delta / g_norm);
    }

    // ||sd + tau (gn - sd)|| = delta, tau in [0, 1]
    let diff = &gn - &sd;
    let a = diff.norm_squared();
    let b = 2.0 * sd.dot(&diff);
    let c = sd_norm * sd_norm - delta * delta;
    let tau = if a > 0.0 {
        ((-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    sd + diff * tau
}

fn broyden_update(jac: &mut DMatrix<f64>, f: &DVector<f64>, f_new: &DVector<f64>, p: &DVector<f64>) {
    let pp = p.norm_squared();
    let y = f_new - f - &*jac * p;
    *jac += (y / pp) * p.transpose();
}
