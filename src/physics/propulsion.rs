use nalgebra::{DMatrix, Vector3};

use super::{stack3, THRUST_FORCE};
use crate::process::Step;
use crate::segment::common::held;
use crate::segment::Segment;

pub const THROTTLE: &str = "propulsion.throttle";
pub const THRUST: &str = "propulsion.thrust";

/// Unpowered flight.
pub fn no_thrust() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &mut seg.state.conditions;
        c.set_filled(THRUST, 0.0, 1)?;
        c.set_filled(THRUST_FORCE, 0.0, 3)?;
        Ok(())
    })
}

/// Thrust proportional to throttle, along the body axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantThrust {
    pub max_thrust: f64,
}

impl ConstantThrust {
    pub fn step(self) -> Step {
        Step::conditions(move |seg: &mut Segment| {
            let c = &seg.state.conditions;
            let throttle = c.column(THROTTLE)?;
            let theta = c.column("frames.body.inclination_angle")?;

            let thrust = throttle.map(|t| t * self.max_thrust);
            let forces: Vec<Vector3<f64>> = thrust
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let th = held(&theta, i).unwrap_or(0.0);
                    Vector3::new(th.cos(), 0.0, th.sin()) * *f
                })
                .collect();

            let c = &mut seg.state.conditions;
            c.set_array(THRUST, DMatrix::from_column_slice(thrust.len(), 1, thrust.as_slice()))?;
            c.set_array(THRUST_FORCE, stack3(&forces))?;
            Ok(())
        })
    }
}
