use std::process::ExitCode;

use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use flight_segments::mission::presets;
use flight_segments::physics::atmosphere;
use flight_segments::physics::propulsion::THROTTLE;
use flight_segments::segment::common::{POSITION, TIME, VELOCITY};
use flight_segments::vehicle::presets as vehicles;
use flight_segments::{Mission, MissionResults, Result};

const LOG_ENV: &str = "FLIGHT_SEGMENTS_LOG";

fn main() -> ExitCode {
    let level = match std::env::var(LOG_ENV)
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global tracing subscriber is already installed");
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // -----------------------------------------------------------------------
    // Vehicle and mission
    // -----------------------------------------------------------------------
    let vehicle = vehicles::trainer();
    let mut mission = presets::climb_and_cruise(&vehicle)?;

    // -----------------------------------------------------------------------
    // Solve
    // -----------------------------------------------------------------------
    let results = mission.evaluate()?;

    // -----------------------------------------------------------------------
    // Print results
    // -----------------------------------------------------------------------
    println!();
    println!("====================================================================");
    println!("  FLIGHT SEGMENTS — {} ({})", mission.name, vehicle.name);
    println!("====================================================================");
    println!();
    println!("  Vehicle Parameters");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  Mass:          {:>8.1} kg    Wing area:    {:>8.1} m^2",
        vehicle.mass, vehicle.reference_area
    );
    println!(
        "  Max thrust:    {:>8.0} N     T/W:          {:>8.2}",
        vehicle.max_thrust,
        vehicle.thrust_to_weight()
    );
    println!(
        "  CD0:           {:>8.4}       (L/D)max:     {:>8.1}",
        vehicle.zero_lift_drag,
        vehicle.max_lift_to_drag()
    );
    println!();

    print_summary(&results);
    print_profiles(&mission);

    println!("====================================================================");
    println!();
    Ok(())
}

fn print_summary(results: &MissionResults) {
    println!("  Segments");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  {:<10}  {:>9}  {:>9}  {:>9}  {:>10}  {:>6}  {:>9}",
        "name", "t0 (s)", "t1 (s)", "alt (m)", "range (m)", "evals", "status"
    );
    println!("  {}", "─".repeat(72));
    for s in &results.segments {
        println!(
            "  {:<10}  {:>9.1}  {:>9.1}  {:>9.1}  {:>10.0}  {:>6}  {:>9}",
            s.name,
            s.start_time,
            s.end_time,
            s.final_altitude,
            s.final_range,
            s.evaluations,
            if s.converged { "CONVERGED" } else { "FAILED" }
        );
    }
    println!();
    println!(
        "  Total flight time: {:>8.1} s ({:.1} min)",
        results.total_duration(),
        results.total_duration() / 60.0
    );
    for name in results.not_converged() {
        println!("  WARNING: segment {name} did not converge; its outputs are unreliable");
    }
    println!();
}

fn print_profiles(mission: &Mission) {
    for segment in &mission.segments {
        let c = &segment.state.conditions;
        let (Ok(t), Ok(pos), Ok(vel), Ok(throttle)) = (
            c.array(TIME),
            c.array(POSITION),
            c.array(VELOCITY),
            c.column(THROTTLE),
        ) else {
            continue;
        };

        println!("  {} profile", segment.name);
        println!("  ──────────────────────────────────────────────────────────────────");
        println!(
            "  {:>7}  {:>9}  {:>9}  {:>9}  {:>7}  {:>8}",
            "t (s)", "x (m)", "alt (m)", "vel (m/s)", "Mach", "throttle"
        );
        println!("  {}", "─".repeat(60));
        for i in 0..t.nrows() {
            let speed = vel.row(i).norm();
            let mach = speed / atmosphere::isa(pos[(i, 2)]).sound_speed;
            println!(
                "  {:>7.1}  {:>9.1}  {:>9.1}  {:>9.2}  {:>7.3}  {:>8.3}",
                t[(i, 0)],
                pos[(i, 0)],
                pos[(i, 2)],
                speed,
                mach,
                throttle[i.min(throttle.len() - 1)]
            );
        }
        println!();
    }
}
