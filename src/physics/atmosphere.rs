use nalgebra::DMatrix;

use super::gravity::G0;
use super::row3;
use crate::process::Step;
use crate::segment::Segment;

// ---------------------------------------------------------------------------
// ISA 1976 standard atmosphere
// ---------------------------------------------------------------------------

const R_AIR: f64 = 287.052_87; // J/(kg·K)
const GAMMA: f64 = 1.4;

/// `(base altitude m, base temperature K, lapse K/m, base pressure Pa)`.
const LAYERS: [(f64, f64, f64, f64); 7] = [
    (0.0, 288.15, -0.0065, 101_325.0),
    (11_000.0, 216.65, 0.0, 22_632.1),
    (20_000.0, 216.65, 0.001, 5_474.89),
    (32_000.0, 228.65, 0.0028, 868.019),
    (47_000.0, 270.65, 0.0, 110.906),
    (51_000.0, 270.65, -0.0028, 66.9389),
    (71_000.0, 214.65, -0.002, 3.956_42),
];

const UPPER_LIMIT: f64 = 86_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atmosphere {
    pub density: f64,
    pub pressure: f64,
    pub temperature: f64,
    pub sound_speed: f64,
}

/// Standard atmosphere at geometric altitude `altitude` (m).
///
/// Negative altitudes read as sea level. Above 86 km pressure decays
/// exponentially at a fixed temperature.
pub fn isa(altitude: f64) -> Atmosphere {
    let h = altitude.max(0.0);

    let (temperature, pressure) = if h >= UPPER_LIMIT {
        (186.87, 0.3734 * (-0.000_15 * (h - UPPER_LIMIT)).exp())
    } else {
        let &(h_base, t_base, lapse, p_base) = LAYERS
            .iter()
            .rev()
            .find(|layer| h >= layer.0)
            .unwrap_or(&LAYERS[0]);
        layer_state(h - h_base, t_base, lapse, p_base)
    };

    Atmosphere {
        density: pressure / (R_AIR * temperature),
        pressure,
        temperature,
        sound_speed: (GAMMA * R_AIR * temperature).sqrt(),
    }
}

/// Hydrostatic pressure `dz` metres above a layer base.
fn layer_state(dz: f64, t_base: f64, lapse: f64, p_base: f64) -> (f64, f64) {
    if lapse == 0.0 {
        let p = p_base * (-G0 * dz / (R_AIR * t_base)).exp();
        (t_base, p)
    } else {
        let t = t_base + lapse * dz;
        let p = p_base * (t / t_base).powf(-G0 / (lapse * R_AIR));
        (t, p)
    }
}

// ---------------------------------------------------------------------------
// Freestream step
// ---------------------------------------------------------------------------

/// Fill `freestream` from the altitude column and the inertial velocity.
pub fn update_atmosphere() -> Step {
    Step::conditions(|seg: &mut Segment| {
        let c = &seg.state.conditions;
        let altitude = c.column("freestream.altitude")?;
        let velocity = c.array("frames.inertial.velocity_vector")?;

        let n = altitude.len();
        let mut out = DMatrix::zeros(n, 7);
        for (i, h) in altitude.iter().enumerate() {
            let atmo = isa(*h);
            let speed = row3(velocity, i).norm();
            out[(i, 0)] = atmo.density;
            out[(i, 1)] = atmo.pressure;
            out[(i, 2)] = atmo.temperature;
            out[(i, 3)] = atmo.sound_speed;
            out[(i, 4)] = speed;
            out[(i, 5)] = speed / atmo.sound_speed;
            out[(i, 6)] = 0.5 * atmo.density * speed * speed;
        }

        let freestream = seg.state.conditions.child_mut("freestream")?;
        let names = [
            "density",
            "pressure",
            "temperature",
            "speed_of_sound",
            "velocity",
            "mach_number",
            "dynamic_pressure",
        ];
        for (j, name) in names.into_iter().enumerate() {
            freestream.set_array(name, out.columns(j, 1).into_owned())?;
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
