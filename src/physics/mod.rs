//! Simple physical models bound into `iterate.conditions` slots.
//!
//! These are collaborators of the solve engine, not validated correlations:
//! standard atmosphere, inverse-square gravity, a parabolic drag polar and
//! throttled constant thrust.

pub mod aerodynamics;
pub mod atmosphere;
pub mod gravity;
pub mod propulsion;
pub mod weights;

use nalgebra::{DMatrix, Vector3};

use crate::process::Step;
use crate::segment::Segment;

pub const THRUST_FORCE: &str = "frames.body.thrust_force_vector";
pub const DRAG_FORCE: &str = "frames.wind.drag_force_vector";
pub const LIFT_FORCE: &str = "frames.wind.lift_force_vector";
pub const GRAVITY_FORCE: &str = "frames.inertial.gravity_force_vector";
pub const TOTAL_FORCE: &str = "frames.inertial.total_force_vector";

/// Row `i` of an `n x 3` leaf; missing columns read as zero.
pub(crate) fn row3(m: &DMatrix<f64>, i: usize) -> Vector3<f64> {
    let i = i.min(m.nrows().saturating_sub(1));
    Vector3::from_fn(|j, _| if j < m.ncols() && m.nrows() > 0 { m[(i, j)] } else { 0.0 })
}

/// Stack per-row vectors into an `n x 3` leaf.
pub(crate) fn stack3(rows: &[Vector3<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), 3, |i, j| rows[i][j])
}

/// Sum body, wind and gravity forces into the inertial total.
pub fn update_forces() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &seg.state.conditions;
        let parts = [
            c.array(THRUST_FORCE)?,
            c.array(DRAG_FORCE)?,
            c.array(LIFT_FORCE)?,
            c.array(GRAVITY_FORCE)?,
        ];
        let rows = parts.iter().map(|m| m.nrows()).max().unwrap_or(1);
        let total: Vec<Vector3<f64>> = (0..rows)
            .map(|i| parts.iter().map(|m| row3(m, i)).sum())
            .collect();
        seg.state.conditions.set_array(TOTAL_FORCE, stack3(&total))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row3_pads_missing_columns() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(row3(&m, 1), Vector3::new(3.0, 4.0, 0.0));
        assert_eq!(row3(&m, 9), Vector3::new(3.0, 4.0, 0.0));
        assert_eq!(stack3(&[row3(&m, 0)]).shape(), (1, 3));
    }
}
