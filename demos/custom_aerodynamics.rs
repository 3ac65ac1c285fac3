use nalgebra::{DMatrix, Vector3};

use flight_segments::phases::climb;
use flight_segments::physics::aerodynamics::{drag_force, lift_force};
use flight_segments::physics::{DRAG_FORCE, LIFT_FORCE};
use flight_segments::process::{Region, Step};
use flight_segments::segment::common::{POSITION, TIME, VELOCITY};
use flight_segments::vehicle::VehicleBuilder;
use flight_segments::{Parameters, Result, Segment};

/// Drag polar with a drag rise above a critical lift coefficient, bound in
/// place of the vehicle's parabolic polar.
fn drag_rise_polar(area: f64, cl_critical: f64) -> Step {
    Step::conditions(move |seg: &mut Segment| {
        let c = &seg.state.conditions;
        let theta = c.column("frames.body.inclination_angle")?;
        let q = c.column("freestream.dynamic_pressure")?;
        let vel = c.array(VELOCITY)?;

        let n = q.len();
        let mut drag = Vec::with_capacity(n);
        let mut lift = Vec::with_capacity(n);
        for i in 0..n {
            let v = Vector3::new(vel[(i, 0)], vel[(i, 1)], vel[(i, 2)]);
            let alpha = theta[i] - v.z.atan2(v.x);
            let cl = 5.0 * alpha;
            let excess = (cl - cl_critical).max(0.0);
            let cd = 0.03 + 0.06 * cl * cl + 2.0 * excess * excess;
            drag.push(drag_force(&v, q[i], cd, area));
            lift.push(lift_force(&v, q[i], cl, area));
        }

        let c = &mut seg.state.conditions;
        c.set_array(DRAG_FORCE, DMatrix::from_fn(n, 3, |i, j| drag[i][j]))?;
        c.set_array(LIFT_FORCE, DMatrix::from_fn(n, 3, |i, j| lift[i][j]))?;
        Ok(())
    })
}

fn main() -> Result<()> {
    let vehicle = VehicleBuilder::new("Glider tug")
        .mass(900.0)
        .reference_area(15.0)
        .max_thrust(3500.0)
        .build();

    let params = Parameters::new()
        .with("altitude_start", 0.0)
        .with("altitude_end", 1200.0)
        .with("air_speed", 55.0)
        .with("climb_rate", 2.5);
    let mut segment = climb::constant_speed_constant_rate("Tow climb", params, &vehicle)?;

    // The slot is rebound; everything else in the climb stays as configured.
    segment
        .process
        .set("iterate.conditions.aerodynamics", drag_rise_polar(15.0, 0.6))?;

    // A step declaring writes to the unknowns is refused before anything runs.
    let mut misbehaving = segment.clone();
    misbehaving.process.set(
        "iterate.conditions.aerodynamics",
        Step::new(&[Region::Unknowns], |_| Ok(())),
    )?;
    if let Err(e) = misbehaving.evaluate() {
        println!("Rejected: {e}");
    }

    println!("Solving {} with a custom drag polar...", segment.name);
    segment.evaluate()?;

    let c = &segment.state.conditions;
    let t = c.column(TIME)?;
    let x = c.column(POSITION)?;
    println!("Converged: {}", segment.converged());
    println!("Evaluations: {}", segment.state.numerics.evaluations);
    println!("Climb time: {:.1} s", t[t.len() - 1] - t[0]);
    println!("Ground distance: {:.0} m", x[x.len() - 1]);
    Ok(())
}
