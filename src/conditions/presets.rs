//! Standard condition subtrees shared by flight-phase configurations.
//!
//! Vectors use the ENU-style frame of the flight-path solvers: column 0 is
//! horizontal range, column 2 is altitude (positive up).

use super::Conditions;

/// Inertial, body and wind frame quantities.
pub fn frames() -> Conditions {
    Conditions::new()
        .subtree(
            "inertial",
            Conditions::new()
                .leaf("position_vector", 3)
                .leaf("velocity_vector", 3)
                .leaf("acceleration_vector", 3)
                .leaf("gravity_force_vector", 3)
                .leaf("total_force_vector", 3)
                .leaf("time", 1),
        )
        .subtree(
            "body",
            Conditions::new()
                .leaf("inclination_angle", 1)
                .leaf("thrust_force_vector", 3),
        )
        .subtree(
            "wind",
            Conditions::new()
                .leaf("drag_force_vector", 3)
                .leaf("lift_force_vector", 3),
        )
}

/// Atmospheric and flow state at each collocation point.
pub fn freestream() -> Conditions {
    Conditions::new()
        .leaf("altitude", 1)
        .leaf("density", 1)
        .leaf("pressure", 1)
        .leaf("temperature", 1)
        .leaf("speed_of_sound", 1)
        .leaf("velocity", 1)
        .leaf("mach_number", 1)
        .leaf("dynamic_pressure", 1)
        .leaf("gravity", 1)
}

pub fn aerodynamics() -> Conditions {
    Conditions::new()
        .leaf("angle_of_attack", 1)
        .leaf("lift_coefficient", 1)
        .leaf("drag_coefficient", 1)
}

pub fn propulsion() -> Conditions {
    Conditions::new().leaf("throttle", 1).leaf("thrust", 1)
}

pub fn weights() -> Conditions {
    Conditions::new()
        .leaf("total_mass", 1)
        .leaf("vehicle_mass_rate", 1)
}

pub fn energy() -> Conditions {
    Conditions::new().leaf("total_energy", 1)
}

/// Every standard subtree under one root.
pub fn basic() -> Conditions {
    Conditions::new()
        .subtree("frames", frames())
        .subtree("freestream", freestream())
        .subtree("aerodynamics", aerodynamics())
        .subtree("propulsion", propulsion())
        .subtree("weights", weights())
        .subtree("energy", energy())
}
