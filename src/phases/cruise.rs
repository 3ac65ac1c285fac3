//! Cruise segments.

use super::climb;
use crate::error::{Result, SegmentError};
use crate::process::{Region, Step};
use crate::segment::common::{self, TIME};
use crate::segment::{Parameters, Segment};
use crate::vehicle::Vehicle;

/// Level flight at constant airspeed over a fixed ground distance.
///
/// Parameters: `altitude`, `air_speed`, `distance`. This is the constant
/// speed climb with a zero climb rate and the `time` slot rebound to a
/// distance-driven duration.
pub fn constant_speed_constant_altitude(
    name: &str,
    parameters: Parameters,
    vehicle: &Vehicle,
) -> Result<Segment> {
    let altitude = parameters.get("altitude")?;
    let parameters = parameters
        .with("altitude_start", altitude)
        .with("altitude_end", altitude)
        .with("climb_rate", 0.0);

    let mut segment = climb::constant_speed_constant_rate(name, parameters, vehicle)?;
    segment.process.set(
        "initialize.parameters",
        common::require_parameters(&["altitude", "air_speed", "distance"]),
    )?;
    segment.process.set("iterate.initials.time", time_from_distance())?;
    Ok(segment)
}

/// Duration from distance over airspeed.
pub fn time_from_distance() -> Step {
    Step::new(&[Region::Numerics, Region::Conditions], |seg: &mut Segment| {
        let distance = seg.parameter("distance")?;
        let speed = seg.parameter("air_speed")?;
        let duration = distance / speed;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(SegmentError::step(
                "time",
                format!("cannot cover {distance} m at {speed} m/s"),
            ));
        }
        let t0 = seg.state.conditions.array(TIME)?[(0, 0)];
        common::set_time(seg, t0, duration)
    })
}
