//! Climb segments.

use nalgebra::{DMatrix, DVector};

use super::base_process;
use crate::conditions::{presets, Conditions};
use crate::error::{Result, SegmentError};
use crate::physics::propulsion::THROTTLE;
use crate::physics::{aerodynamics, propulsion, weights, TOTAL_FORCE};
use crate::process::{Pipeline, Region, Step};
use crate::segment::common::{self, POSITION, TIME, TOTAL_MASS, VELOCITY};
use crate::segment::{Parameters, Segment, SegmentBuilder};
use crate::vehicle::Vehicle;

const ALTITUDE: &str = "freestream.altitude";
const BODY_ANGLE: &str = "frames.body.inclination_angle";
const ACCELERATION: &str = "frames.inertial.acceleration_vector";

/// Default duration guess for [`constant_rate`] when `duration_guess` is unset.
pub const DEFAULT_DURATION_GUESS: f64 = 100.0;

// ---------------------------------------------------------------------------
// Constant climb rate, kinematic
// ---------------------------------------------------------------------------

/// Vertical climb at a constant rate with no aerodynamic or propulsive
/// forces.
///
/// Parameters: `altitude_start`, `altitude_end`, `climb_rate`, optionally
/// `duration_guess`. Unknowns are the altitude at every collocation point
/// but the first, and the duration. Residuals are the altitude-rate error
/// at those points and the final altitude error.
pub fn constant_rate(name: &str, parameters: Parameters) -> Result<Segment> {
    let mut process = base_process(&["altitude_start", "altitude_end", "climb_rate"]);
    process.initialize = process
        .initialize
        .step("initial_guess", Step::new(&[Region::Unknowns], guess_altitude_profile));
    process.iterate.unknowns = Pipeline::new()
        .step("altitude", Step::conditions(unpack_altitude))
        .step("time", common::update_time_from_duration("boundary.duration"))
        .step("velocity", common::update_velocity_from_position());
    process.set("iterate.conditions.weights", Step::Skip)?;
    process.set("iterate.conditions.aerodynamics", aerodynamics::zero_forces())?;
    process.set("iterate.conditions.propulsion", propulsion::no_thrust())?;
    process.iterate.residuals = Pipeline::new().step(
        "climb_rate",
        Step::new(&[Region::Residuals], altitude_rate_residual),
    );
    process.insert("finalize.time", common::integrate_time())?;

    let unknowns = Conditions::new()
        .subtree(
            "profile",
            Conditions::with_row_size_adjustment(-1).leaf("altitude", 1),
        )
        .subtree("boundary", Conditions::single_row().leaf("duration", 1));
    let residuals = Conditions::new()
        .subtree(
            "profile",
            Conditions::with_row_size_adjustment(-1).leaf("altitude_rate", 1),
        )
        .subtree("boundary", Conditions::single_row().leaf("altitude_end", 1));

    Ok(SegmentBuilder::new(name)
        .parameters(parameters)
        .conditions(presets::basic())
        .unknowns(unknowns)
        .residuals(residuals)
        .process(process)
        .build())
}

/// Linear altitude ramp between the boundary altitudes.
fn guess_altitude_profile(seg: &mut Segment) -> Result<()> {
    let h0 = seg.parameter("altitude_start")?;
    let h1 = seg.parameter("altitude_end")?;
    let duration = seg.parameters.get_or("duration_guess", DEFAULT_DURATION_GUESS);

    let nodes = &seg.state.numerics.dimensionless.control_points;
    let profile = DMatrix::from_fn(nodes.len().saturating_sub(1), 1, |i, _| {
        h0 + (h1 - h0) * nodes[i + 1]
    });
    let u = &mut seg.state.unknowns;
    u.set_array("profile.altitude", profile)?;
    u.set_scalar("boundary.duration", duration)?;
    Ok(())
}

/// Altitude column from the start altitude plus the unknown profile.
fn unpack_altitude(seg: &mut Segment) -> Result<()> {
    let h0 = seg.parameter("altitude_start")?;
    let profile = seg.state.unknowns.column("profile.altitude")?;
    let altitude = DMatrix::from_fn(profile.len() + 1, 1, |i, _| {
        if i == 0 {
            h0
        } else {
            profile[i - 1]
        }
    });

    let c = &mut seg.state.conditions;
    c.set_array(ALTITUDE, altitude.clone())?;
    let position = c.array_mut(POSITION)?;
    common::check_vector_leaf("altitude", POSITION, position)?;
    for i in 0..position.nrows() {
        position[(i, 0)] = position[(0, 0)];
        position[(i, 1)] = position[(0, 1)];
        position[(i, 2)] = altitude[(i.min(altitude.nrows() - 1), 0)];
    }
    Ok(())
}

fn altitude_rate_residual(seg: &mut Segment) -> Result<()> {
    let rate = seg.parameter("climb_rate")?;
    let h_end = seg.parameter("altitude_end")?;
    let altitude = seg.state.conditions.column(ALTITUDE)?;
    let d = &seg.state.numerics.time.differentiate;
    if d.ncols() != altitude.len() {
        return Err(SegmentError::step(
            "climb_rate",
            "differentiation operator does not match the altitude column",
        ));
    }

    let dh: DVector<f64> = d * &altitude;
    let n = altitude.len();
    let rate_error = DMatrix::from_fn(n - 1, 1, |i, _| dh[i + 1] - rate);
    let end_error = DMatrix::from_element(1, 1, altitude[n - 1] - h_end);

    let r = &mut seg.state.residuals;
    r.set_array("profile.altitude_rate", rate_error)?;
    r.set_array("boundary.altitude_end", end_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Constant speed, constant rate, force balance
// ---------------------------------------------------------------------------

/// Climb at constant true airspeed and constant rate of climb.
///
/// Parameters: `altitude_start`, `altitude_end`, `air_speed`, `climb_rate`.
/// The duration follows from the climb rate. Unknowns are throttle and body
/// angle at every collocation point; residuals are the horizontal and
/// vertical force balance.
pub fn constant_speed_constant_rate(
    name: &str,
    parameters: Parameters,
    vehicle: &Vehicle,
) -> Result<Segment> {
    let mut process = base_process(&["altitude_start", "altitude_end", "air_speed", "climb_rate"]);
    process.initialize = process
        .initialize
        .step("initial_guess", Step::new(&[Region::Unknowns], guess_controls));
    process.iterate.initials = process
        .iterate
        .initials
        .step("time", time_from_climb_rate())
        .step("kinematics", Step::conditions(constant_speed_kinematics));
    process.iterate.unknowns = Pipeline::new().step("controls", Step::conditions(unpack_controls));
    process.set("iterate.conditions.weights", weights::constant_mass(vehicle.mass))?;
    process.set("iterate.conditions.aerodynamics", vehicle.drag_polar().step())?;
    process.set("iterate.conditions.propulsion", vehicle.propulsion().step())?;
    process.iterate.residuals = Pipeline::new().step(
        "total_forces",
        Step::new(&[Region::Residuals], force_balance_residual),
    );

    let unknowns = Conditions::new().leaf("throttle", 1).leaf("body_angle", 1);
    let residuals = Conditions::new().leaf("forces_x", 1).leaf("forces_z", 1);

    Ok(SegmentBuilder::new(name)
        .parameters(parameters)
        .conditions(presets::basic())
        .unknowns(unknowns)
        .residuals(residuals)
        .process(process)
        .build())
}

/// Half throttle, body a few degrees above the flight path.
fn guess_controls(seg: &mut Segment) -> Result<()> {
    let gamma = flight_path_angle(seg)?;
    let u = &mut seg.state.unknowns;
    u.set_scalar("throttle", 0.5)?;
    u.set_scalar("body_angle", gamma + 3f64.to_radians())?;
    Ok(())
}

fn flight_path_angle(seg: &Segment) -> Result<f64> {
    let speed = seg.parameter("air_speed")?;
    let rate = seg.parameter("climb_rate")?;
    if speed <= 0.0 || rate.abs() > speed {
        return Err(SegmentError::step(
            "kinematics",
            format!("climb rate {rate} m/s is not reachable at {speed} m/s"),
        ));
    }
    Ok((rate / speed).asin())
}

/// Duration from the altitude change and the climb rate.
pub fn time_from_climb_rate() -> Step {
    Step::new(&[Region::Numerics, Region::Conditions], |seg: &mut Segment| {
        let h0 = seg.parameter("altitude_start")?;
        let h1 = seg.parameter("altitude_end")?;
        let rate = seg.parameter("climb_rate")?;
        let duration = (h1 - h0) / rate;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(SegmentError::step(
                "time",
                format!("climb rate {rate} m/s never takes {h0} m to {h1} m"),
            ));
        }
        let t0 = seg.state.conditions.array(TIME)?[(0, 0)];
        common::set_time(seg, t0, duration)
    })
}

/// Altitude, velocity and acceleration at constant airspeed and climb rate.
/// Horizontal position is left to `finalize`.
fn constant_speed_kinematics(seg: &mut Segment) -> Result<()> {
    let gamma = flight_path_angle(seg)?;
    let speed = seg.parameter("air_speed")?;
    let rate = seg.parameter("climb_rate")?;
    let h0 = seg.parameter("altitude_start")?;

    let t = seg.state.conditions.column(TIME)?;
    let n = t.len();
    let altitude = DMatrix::from_fn(n, 1, |i, _| h0 + rate * (t[i] - t[0]));
    let velocity = DMatrix::from_fn(n, 3, |_, j| match j {
        0 => speed * gamma.cos(),
        2 => speed * gamma.sin(),
        _ => 0.0,
    });
    let acceleration = &seg.state.numerics.time.differentiate * &velocity;

    let c = &mut seg.state.conditions;
    c.set_array(ALTITUDE, altitude.clone())?;
    c.set_array(VELOCITY, velocity)?;
    c.set_array(ACCELERATION, acceleration)?;
    let position = c.array_mut(POSITION)?;
    common::check_vector_leaf("kinematics", POSITION, position)?;
    for i in 0..position.nrows().min(n) {
        position[(i, 2)] = altitude[(i, 0)];
    }
    Ok(())
}

fn unpack_controls(seg: &mut Segment) -> Result<()> {
    let throttle = seg.state.unknowns.array("throttle")?.clone();
    let body_angle = seg.state.unknowns.array("body_angle")?.clone();
    let c = &mut seg.state.conditions;
    c.set_array(THROTTLE, throttle)?;
    c.set_array(BODY_ANGLE, body_angle)?;
    Ok(())
}

/// `F / m - a` in the vertical plane.
fn force_balance_residual(seg: &mut Segment) -> Result<()> {
    let c = &seg.state.conditions;
    let force = c.array(TOTAL_FORCE)?;
    let accel = c.array(ACCELERATION)?;
    let mass = c.column(TOTAL_MASS)?;
    if mass.iter().any(|m| *m <= 0.0) {
        return Err(SegmentError::step("total_forces", "vehicle mass must be positive"));
    }

    let n = force.nrows().min(accel.nrows()).min(mass.len());
    let fx = DMatrix::from_fn(n, 1, |i, _| force[(i, 0)] / mass[i] - accel[(i, 0)]);
    let fz = DMatrix::from_fn(n, 1, |i, _| force[(i, 2)] / mass[i] - accel[(i, 2)]);

    let r = &mut seg.state.residuals;
    r.set_array("forces_x", fx)?;
    r.set_array("forces_z", fz)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::VehicleBuilder;
    use approx::assert_relative_eq;

    fn climb_parameters() -> Parameters {
        Parameters::new()
            .with("altitude_start", 0.0)
            .with("altitude_end", 1000.0)
            .with("climb_rate", 5.0)
    }

    #[test]
    fn constant_rate_recovers_analytic_duration() {
        let mut seg = constant_rate("climb", climb_parameters()).unwrap();
        seg.evaluate().unwrap();
        assert!(seg.converged());

        let t = seg.state.conditions.column(TIME).unwrap();
        assert_relative_eq!(t[t.len() - 1], 200.0, max_relative = 1e-6);
        let h = seg.state.conditions.column_at(POSITION, 2).unwrap();
        assert_relative_eq!(h[h.len() - 1], 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn missing_parameter_fails_in_initialize() {
        let params = Parameters::new().with("altitude_end", 1000.0).with("climb_rate", 5.0);
        let mut seg = constant_rate("climb", params).unwrap();
        assert!(matches!(
            seg.evaluate(),
            Err(SegmentError::Config(crate::error::ConfigError::MissingParameter(_)))
        ));
    }

    #[test]
    fn unknowns_and_residuals_pack_alike() {
        let mut seg = constant_rate("climb", climb_parameters()).unwrap();
        seg.state.unknowns.expand_rows(16);
        seg.state.residuals.expand_rows(16);
        assert_eq!(seg.state.unknowns.packed_len(), 16);
        assert_eq!(seg.state.residuals.packed_len(), 16);
    }

    #[test]
    fn narrowed_position_is_a_step_error() {
        let mut seg = constant_rate("climb", climb_parameters()).unwrap();
        seg.state.conditions.expand_rows(4);
        seg.state.unknowns.expand_rows(4);
        seg.state.conditions.set_array(POSITION, DMatrix::zeros(4, 2)).unwrap();
        assert!(matches!(unpack_altitude(&mut seg), Err(SegmentError::Step { .. })));
    }

    #[test]
    fn force_balance_climb_trims_the_vehicle() {
        let vehicle = VehicleBuilder::new("Trainer").build();
        let params = Parameters::new()
            .with("altitude_start", 500.0)
            .with("altitude_end", 1500.0)
            .with("air_speed", 60.0)
            .with("climb_rate", 3.0);
        let mut seg = constant_speed_constant_rate("climb", params, &vehicle).unwrap();
        seg.state.numerics.config.number_of_control_points = 8;
        seg.evaluate().unwrap();
        assert!(seg.converged());

        let c = &seg.state.conditions;
        let throttle = c.column(THROTTLE).unwrap();
        assert!(throttle.iter().all(|t| *t > 0.0 && *t < 1.0));
        let t = c.column(TIME).unwrap();
        assert_relative_eq!(t[7] - t[0], 1000.0 / 3.0, max_relative = 1e-12);
        // horizontal distance from integrating a constant ground speed
        let x = c.column(POSITION).unwrap();
        let ground_speed = (60.0_f64 * 60.0 - 9.0).sqrt();
        assert_relative_eq!(x[7], ground_speed * 1000.0 / 3.0, max_relative = 1e-9);
    }
}
