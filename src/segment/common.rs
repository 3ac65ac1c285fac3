//! Steps shared by every flight-phase configuration.
//!
//! Each function returns a [`Step`] ready to bind into a process slot,
//! with its write set declared.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::Segment;
use crate::error::{Result, SegmentError};
use crate::physics::row3;
use crate::process::{Region, Step};

pub const TIME: &str = "frames.inertial.time";
pub const POSITION: &str = "frames.inertial.position_vector";
pub const VELOCITY: &str = "frames.inertial.velocity_vector";
pub const TOTAL_MASS: &str = "weights.total_mass";
pub const GRAVITY: &str = "freestream.gravity";
pub const TOTAL_ENERGY: &str = "energy.total_energy";

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

/// Fail early when a boundary parameter the configuration relies on is absent.
pub fn require_parameters(names: &'static [&'static str]) -> Step {
    Step::new(&[], move |seg: &mut Segment| {
        for name in names {
            seg.parameter(name)?;
        }
        Ok(())
    })
}

/// Size every tree for the configured number of control points.
pub fn expand_state() -> Step {
    Step::new(
        &[Region::Conditions, Region::Unknowns, Region::Residuals],
        |seg: &mut Segment| {
            let n = seg.state.numerics.number_of_control_points();
            seg.state.conditions.expand_rows(n);
            seg.state.unknowns.expand_rows(n);
            seg.state.residuals.expand_rows(n);
            Ok(())
        },
    )
}

/// Build (or reuse) the dimensionless operators, with unit-duration time
/// operators until a duration is known.
pub fn dimensionless_operators() -> Step {
    Step::new(&[Region::Numerics], |seg: &mut Segment| {
        let numerics = &mut seg.state.numerics;
        numerics.discretize()?;
        numerics.update_time_operators(0.0, 1.0);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// iterate
// ---------------------------------------------------------------------------

/// Last-row value of a leaf in the preceding segment's final conditions.
pub fn initial_value(seg: &Segment, path: &str, column: usize) -> Option<f64> {
    let m = seg.state.initials.as_ref()?.array(path).ok()?;
    if m.nrows() == 0 || column >= m.ncols() {
        return None;
    }
    Some(m[(m.nrows() - 1, column)])
}

/// Seed start time and start position from the preceding segment, or from
/// zero for the first segment of a mission.
pub fn seed_initials() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let t0 = initial_value(seg, TIME, 0).unwrap_or(0.0);
        let p0: Vec<f64> = (0..3)
            .map(|j| initial_value(seg, POSITION, j).unwrap_or(0.0))
            .collect();

        let c = &mut seg.state.conditions;
        c.set_filled(TIME, t0, 1)?;
        let position = c.array_mut(POSITION)?;
        for (j, v) in p0.into_iter().enumerate().take(position.ncols()) {
            position[(0, j)] = v;
        }
        Ok(())
    })
}

/// Rebuild time operators and the time column for `[t0, t0 + duration]`.
pub fn set_time(seg: &mut Segment, t0: f64, duration: f64) -> Result<()> {
    let numerics = &mut seg.state.numerics;
    numerics.update_time_operators(t0, duration);
    let t = &numerics.time.control_points;
    let column = DMatrix::from_column_slice(t.len(), 1, t.as_slice());
    seg.state.conditions.set_array(TIME, column)?;
    Ok(())
}

/// Duration taken from the single-row unknown at `path`.
pub fn update_time_from_duration(path: &'static str) -> Step {
    Step::new(&[Region::Numerics, Region::Conditions], move |seg: &mut Segment| {
        let duration = seg.state.unknowns.array(path)?[(0, 0)];
        let t0 = seg.state.conditions.array(TIME)?[(0, 0)];
        set_time(seg, t0, duration)
    })
}

/// Inertial velocity as the time derivative of position.
pub fn update_velocity_from_position() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let d = &seg.state.numerics.time.differentiate;
        let position = seg.state.conditions.array(POSITION)?;
        check_operator("update_velocity_from_position", d, position)?;
        let velocity = d * position;
        seg.state.conditions.set_array(VELOCITY, velocity)?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// converge
// ---------------------------------------------------------------------------

/// Write the solver's guess into the unknowns tree.
pub fn unpack_unknowns(seg: &mut Segment, x: &DVector<f64>) -> Result<()> {
    seg.state.unknowns.unpack_array(x.as_slice())?;
    Ok(())
}

pub fn pack_residuals(seg: &Segment) -> DVector<f64> {
    DVector::from_vec(seg.state.residuals.pack_array())
}

/// Drive `iterate` with the segment's root solver until the residuals
/// vanish or the evaluation budget runs out.
///
/// The state left behind is the one computed at the returned solution when
/// converged, otherwise the one from the last evaluation.
pub fn converge_root() -> Step {
    Step::new(
        &[
            Region::Numerics,
            Region::Conditions,
            Region::Unknowns,
            Region::Residuals,
        ],
        |seg: &mut Segment| {
            let iterate = seg.process.iterate.clone();
            let config = seg.solver.clone();
            let solver = config.method.solver();
            let x0 = DVector::from_vec(seg.state.unknowns.pack_array());

            let mut last: Option<DVector<f64>> = None;
            let solution = {
                let mut residual_fn = |x: &DVector<f64>| -> Result<DVector<f64>> {
                    unpack_unknowns(seg, x)?;
                    iterate.run(seg)?;
                    last = Some(x.clone());
                    Ok(pack_residuals(seg))
                };
                solver.solve(&mut residual_fn, x0, &config)?
            };

            if solution.converged && last.as_ref() != Some(&solution.x) {
                unpack_unknowns(seg, &solution.x)?;
                iterate.run(seg)?;
            }

            debug!(
                segment = %seg.name,
                solver = solver.name(),
                converged = solution.converged,
                evaluations = solution.evaluations,
                jacobians = solution.jacobian_evaluations,
                "root solve finished"
            );
            let numerics = &mut seg.state.numerics;
            numerics.converged = solution.converged;
            numerics.evaluations = solution.evaluations;
            numerics.jacobian_evaluations = solution.jacobian_evaluations;
            numerics.final_residual = solution.max_residual();
            Ok(())
        },
    )
}

// ---------------------------------------------------------------------------
// finalize
// ---------------------------------------------------------------------------

/// `position = position[0] + I_t @ velocity`.
pub fn integrate_position() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let integrate = seg.state.numerics.time.integrate()?;
        let c = &seg.state.conditions;
        let velocity = c.array(VELOCITY)?;
        check_operator("integrate_position", integrate, velocity)?;

        let start = c.array(POSITION)?.row(0).into_owned();
        let mut position = integrate * velocity;
        for j in 0..position.ncols().min(start.ncols()) {
            position.column_mut(j).add_scalar_mut(start[j]);
        }
        seg.state.conditions.set_array(POSITION, position)?;
        Ok(())
    })
}

/// `time = time[0] + I_t @ 1`, the elapsed time recovered by quadrature.
pub fn integrate_time() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let integrate = seg.state.numerics.time.integrate()?;
        let t0 = seg.state.conditions.array(TIME)?[(0, 0)];
        let ones = DMatrix::from_element(integrate.ncols(), 1, 1.0);
        let time = (integrate * ones).add_scalar(t0);
        seg.state.conditions.set_array(TIME, time)?;
        Ok(())
    })
}

/// Specific potential plus kinetic energy times mass.
pub fn update_energy() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &seg.state.conditions;
        let mass = c.column(TOTAL_MASS)?;
        let gravity = c.column(GRAVITY)?;
        let altitude = c.column_at(POSITION, 2)?;
        let velocity = c.array(VELOCITY)?;

        let mut energy = DMatrix::zeros(mass.len(), 1);
        for (i, m) in mass.iter().enumerate() {
            let (Some(g), Some(h)) = (held(&gravity, i), held(&altitude, i)) else {
                return Err(SegmentError::step("update_energy", "gravity or altitude has no rows"));
            };
            let v2 = row3(velocity, i).norm_squared();
            energy[(i, 0)] = m * (g * h + 0.5 * v2);
        }
        seg.state.conditions.set_array(TOTAL_ENERGY, energy)?;
        Ok(())
    })
}

/// Entry `i` of a sampled column; shorter columns hold their last value.
pub(crate) fn held(v: &DVector<f64>, i: usize) -> Option<f64> {
    let last = v.len().checked_sub(1)?;
    Some(v[i.min(last)])
}

/// A leaf that must carry the three components of a vector.
pub(crate) fn check_vector_leaf(step: &str, path: &str, m: &DMatrix<f64>) -> Result<()> {
    if m.ncols() < 3 || m.nrows() == 0 {
        return Err(SegmentError::step(
            step,
            format!("{path} is {}x{}, expected three columns", m.nrows(), m.ncols()),
        ));
    }
    Ok(())
}

fn check_operator(step: &str, op: &DMatrix<f64>, operand: &DMatrix<f64>) -> Result<()> {
    if op.ncols() != operand.nrows() || op.ncols() == 0 {
        return Err(SegmentError::step(
            step,
            format!(
                "operator is {}x{} but operand has {} rows",
                op.nrows(),
                op.ncols(),
                operand.nrows()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::presets;
    use crate::conditions::Conditions;
    use crate::error::ConditionsError;
    use crate::segment::SegmentBuilder;
    use approx::assert_relative_eq;

    fn prepared(n: usize) -> Segment {
        let mut seg = SegmentBuilder::new("test")
            .control_points(n)
            .conditions(presets::basic())
            .build();
        for step in [expand_state(), dimensionless_operators()] {
            step.call(&mut seg).unwrap();
        }
        seg
    }

    #[test]
    fn expand_state_sizes_every_tree() {
        let seg = prepared(6);
        assert_eq!(seg.state.conditions.array(POSITION).unwrap().shape(), (6, 3));
        assert_eq!(seg.state.numerics.time.control_points.len(), 6);
    }

    #[test]
    fn seed_initials_reads_previous_final_row() {
        let mut seg = prepared(5);
        let mut previous = presets::basic();
        previous.expand_rows(3);
        previous.set_filled(TIME, 120.0, 1).unwrap();
        previous
            .set_array(
                POSITION,
                DMatrix::from_row_slice(3, 3, &[0.0, 0.0, 0.0, 1.0, 0.0, 5.0, 2000.0, 0.0, 800.0]),
            )
            .unwrap();
        seg.state.initials = Some(previous.last_row());

        seed_initials().call(&mut seg).unwrap();
        let c = &seg.state.conditions;
        assert!(c.column(TIME).unwrap().iter().all(|t| *t == 120.0));
        let p = c.array(POSITION).unwrap();
        assert_eq!((p[(0, 0)], p[(0, 2)]), (2000.0, 800.0));
    }

    #[test]
    fn time_and_position_integrate_consistently() {
        let mut seg = prepared(12);
        set_time(&mut seg, 10.0, 50.0).unwrap();
        let t = seg.state.conditions.column(TIME).unwrap();
        // constant velocity of 3 m/s along x from x = 7
        let velocity = DMatrix::from_fn(12, 3, |_, j| if j == 0 { 3.0 } else { 0.0 });
        let c = &mut seg.state.conditions;
        c.set_array(VELOCITY, velocity).unwrap();
        c.array_mut(POSITION).unwrap()[(0, 0)] = 7.0;

        integrate_position().call(&mut seg).unwrap();
        integrate_time().call(&mut seg).unwrap();

        let c = &seg.state.conditions;
        let x = c.column(POSITION).unwrap();
        let t_int = c.column(TIME).unwrap();
        for i in 0..12 {
            assert_relative_eq!(x[i], 7.0 + 3.0 * (t[i] - 10.0), epsilon = 1e-9);
            assert_relative_eq!(t_int[i], t[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn operator_shape_mismatch_is_a_step_error() {
        let mut seg = prepared(4);
        seg.state.conditions.set_array(POSITION, DMatrix::zeros(6, 3)).unwrap();
        assert!(matches!(
            update_velocity_from_position().call(&mut seg),
            Err(SegmentError::Step { .. })
        ));
    }

    #[test]
    fn energy_sums_potential_and_kinetic() {
        let mut seg = prepared(3);
        let c = &mut seg.state.conditions;
        c.set_scalar(TOTAL_MASS, 2.0).unwrap();
        c.set_scalar(GRAVITY, 9.8).unwrap();
        c.set_array(POSITION, DMatrix::from_fn(3, 3, |i, j| if j == 2 { 100.0 * i as f64 } else { 0.0 }))
            .unwrap();
        c.set_array(VELOCITY, DMatrix::from_fn(3, 3, |_, j| [3.0, 4.0, 0.0][j]))
            .unwrap();

        update_energy().call(&mut seg).unwrap();
        let e = seg.state.conditions.column(TOTAL_ENERGY).unwrap();
        for i in 0..3 {
            let h = 100.0 * i as f64;
            assert_relative_eq!(e[i], 2.0 * (9.8 * h + 12.5), epsilon = 1e-9);
        }
    }

    #[test]
    fn energy_needs_a_vertical_position_component() {
        let mut seg = prepared(4);
        seg.state.conditions.set_array(POSITION, DMatrix::zeros(4, 2)).unwrap();
        assert!(matches!(
            update_energy().call(&mut seg),
            Err(SegmentError::Conditions(ConditionsError::WrongKind { .. }))
        ));
    }

    #[test]
    fn held_repeats_the_last_sample() {
        let v = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(held(&v, 0), Some(1.0));
        assert_eq!(held(&v, 5), Some(2.0));
        assert_eq!(held(&DVector::zeros(0), 0), None);
        assert!(check_vector_leaf("s", POSITION, &DMatrix::zeros(2, 2)).is_err());
        assert!(check_vector_leaf("s", POSITION, &DMatrix::zeros(2, 3)).is_ok());
    }

    #[test]
    fn duration_unknown_drives_time_operators() {
        let mut seg = prepared(8);
        seg.state.unknowns = Conditions::new()
            .subtree("boundary", Conditions::single_row().leaf("duration", 1));
        seg.state.unknowns.set_scalar("boundary.duration", 40.0).unwrap();
        update_time_from_duration("boundary.duration")
            .call(&mut seg)
            .unwrap();
        let t = seg.state.conditions.column(TIME).unwrap();
        assert_relative_eq!(t[7] - t[0], 40.0, epsilon = 1e-12);
    }
}
