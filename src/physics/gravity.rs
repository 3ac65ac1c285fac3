use nalgebra::{DMatrix, Vector3};

use super::{stack3, GRAVITY_FORCE};
use crate::process::Step;
use crate::segment::common::{GRAVITY, TOTAL_MASS};
use crate::segment::Segment;

pub const G0: f64 = 9.806_65; // m/s^2
pub const EARTH_RADIUS: f64 = 6_371_000.0; // m

/// Inverse-square gravity acceleration (ENU, pointing down).
pub fn gravity_accel(altitude: f64) -> Vector3<f64> {
    let alt = altitude.max(0.0);
    let g = G0 * (EARTH_RADIUS / (EARTH_RADIUS + alt)).powi(2);
    Vector3::new(0.0, 0.0, -g)
}

/// `freestream.gravity` and the weight vector at every collocation point.
pub fn update_gravity() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &seg.state.conditions;
        let altitude = c.column("freestream.altitude")?;
        let mass = c.column(TOTAL_MASS)?;

        let accel: Vec<Vector3<f64>> = altitude.iter().map(|h| gravity_accel(*h)).collect();
        let forces: Vec<Vector3<f64>> = accel
            .iter()
            .enumerate()
            .map(|(i, a)| a * mass[i.min(mass.len().saturating_sub(1))])
            .collect();
        let g = DMatrix::from_fn(accel.len(), 1, |i, _| -accel[i].z);

        let c = &mut seg.state.conditions;
        c.set_array(GRAVITY, g)?;
        c.set_array(GRAVITY_FORCE, stack3(&forces))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn falls_off_with_the_square_of_radius() {
        assert_eq!(gravity_accel(0.0), Vector3::new(0.0, 0.0, -G0));
        assert_eq!(gravity_accel(-200.0), gravity_accel(0.0));
        assert_relative_eq!(gravity_accel(EARTH_RADIUS).z, -G0 / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn weight_scales_with_mass() {
        use crate::conditions::presets;
        use crate::segment::SegmentBuilder;

        let mut tree = presets::basic();
        tree.expand_rows(3);
        tree.set_scalar(TOTAL_MASS, 10.0).unwrap();
        let mut seg = SegmentBuilder::new("g").conditions(tree).build();
        update_gravity().call(&mut seg).unwrap();

        let w = seg.state.conditions.array(GRAVITY_FORCE).unwrap();
        assert_eq!(w.shape(), (3, 3));
        assert!((w[(2, 2)] + 10.0 * G0).abs() < 1e-9);
    }
}
