use nalgebra::{DMatrix, Vector3};

use super::{row3, stack3, DRAG_FORCE, LIFT_FORCE};
use crate::process::Step;
use crate::segment::common::{held, VELOCITY};
use crate::segment::Segment;

/// Aerodynamic drag (inertial frame, opposing velocity).
pub fn drag_force(vel: &Vector3<f64>, q_dyn: f64, cd: f64, area: f64) -> Vector3<f64> {
    let speed = vel.norm();
    if speed > 1e-6 {
        -vel / speed * (q_dyn * cd * area)
    } else {
        Vector3::zeros()
    }
}

/// Lift in the vertical plane, perpendicular to velocity and pointing up
/// for forward flight.
pub fn lift_force(vel: &Vector3<f64>, q_dyn: f64, cl: f64, area: f64) -> Vector3<f64> {
    let horizontal = vel.x.hypot(vel.y);
    let speed = vel.norm();
    if speed <= 1e-6 || horizontal <= 1e-9 {
        return Vector3::zeros();
    }
    // rotate the velocity direction +90 deg about the lateral axis
    let up = Vector3::new(
        -vel.x / horizontal * vel.z / speed,
        -vel.y / horizontal * vel.z / speed,
        horizontal / speed,
    );
    up * (q_dyn * cl * area)
}

/// No aerodynamic forces: coefficients and wind-frame forces set to zero.
pub fn zero_forces() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &mut seg.state.conditions;
        for path in [
            "aerodynamics.angle_of_attack",
            "aerodynamics.lift_coefficient",
            "aerodynamics.drag_coefficient",
        ] {
            c.set_filled(path, 0.0, 1)?;
        }
        c.set_filled(DRAG_FORCE, 0.0, 3)?;
        c.set_filled(LIFT_FORCE, 0.0, 3)?;
        Ok(())
    })
}

/// Parabolic polar `CD = CD0 + k CL^2` with linear lift `CL = a alpha`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragPolar {
    pub zero_lift_drag: f64,
    pub induced_drag_factor: f64,
    pub lift_curve_slope: f64,
    pub reference_area: f64,
}

impl DragPolar {
    pub fn coefficients(&self, alpha: f64) -> (f64, f64) {
        let cl = self.lift_curve_slope * alpha;
        let cd = self.zero_lift_drag + self.induced_drag_factor * cl * cl;
        (cl, cd)
    }

    /// Angle of attack from body inclination minus flight-path angle, then
    /// lift and drag from `freestream.dynamic_pressure`.
    pub fn step(self) -> Step {
        Step::conditions(move |seg: &mut Segment| {
            let c = &seg.state.conditions;
            let theta = c.column("frames.body.inclination_angle")?;
            let q = c.column("freestream.dynamic_pressure")?;
            let velocity = c.array(VELOCITY)?;

            let n = q.len();
            let mut coefficients = DMatrix::zeros(n, 3);
            let mut drag = Vec::with_capacity(n);
            let mut lift = Vec::with_capacity(n);
            for i in 0..n {
                let v = row3(velocity, i);
                let gamma = v.z.atan2(v.x.hypot(v.y));
                let alpha = held(&theta, i).unwrap_or(0.0) - gamma;
                let (cl, cd) = self.coefficients(alpha);
                coefficients[(i, 0)] = alpha;
                coefficients[(i, 1)] = cl;
                coefficients[(i, 2)] = cd;
                drag.push(drag_force(&v, q[i], cd, self.reference_area));
                lift.push(lift_force(&v, q[i], cl, self.reference_area));
            }

            let c = &mut seg.state.conditions;
            c.set_array("aerodynamics.angle_of_attack", coefficients.columns(0, 1).into_owned())?;
            c.set_array("aerodynamics.lift_coefficient", coefficients.columns(1, 1).into_owned())?;
            c.set_array("aerodynamics.drag_coefficient", coefficients.columns(2, 1).into_owned())?;
            c.set_array(DRAG_FORCE, stack3(&drag))?;
            c.set_array(LIFT_FORCE, stack3(&lift))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn drag_is_antiparallel_to_velocity() {
        let vel = Vector3::new(30.0, 0.0, 40.0);
        let f = drag_force(&vel, 500.0, 0.04, 10.0);
        assert_abs_diff_eq!(f.x, -120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.y, 0.0);
        assert_abs_diff_eq!(f.z, -160.0, epsilon = 1e-9);
    }

    #[test]
    fn no_forces_at_rest() {
        let vel = Vector3::zeros();
        assert!(drag_force(&vel, 0.0, 0.3, 0.01).norm() < 1e-10);
        assert!(lift_force(&vel, 0.0, 0.5, 0.01).norm() < 1e-10);
    }

    #[test]
    fn lift_is_perpendicular_to_climbing_velocity() {
        let vel = Vector3::new(60.0, 0.0, 5.0);
        let l = lift_force(&vel, 2000.0, 0.4, 16.0);
        assert_abs_diff_eq!(l.dot(&vel), 0.0, epsilon = 1e-9);
        assert!(l.z > 0.0);
        assert_abs_diff_eq!(l.norm(), 2000.0 * 0.4 * 16.0, epsilon = 1e-9);
    }

    #[test]
    fn polar_is_symmetric_in_lift() {
        let polar = DragPolar {
            zero_lift_drag: 0.02,
            induced_drag_factor: 0.05,
            lift_curve_slope: 5.0,
            reference_area: 10.0,
        };
        let (cl_up, cd_up) = polar.coefficients(0.1);
        let (cl_dn, cd_dn) = polar.coefficients(-0.1);
        assert_abs_diff_eq!(cl_up, -cl_dn);
        assert_abs_diff_eq!(cd_up, cd_dn);
        assert_abs_diff_eq!(cd_up, 0.02 + 0.05 * 0.25, epsilon = 1e-15);
    }
}
