use crate::physics::aerodynamics::DragPolar;
use crate::physics::gravity::G0;
use crate::physics::propulsion::ConstantThrust;

// ---------------------------------------------------------------------------
// Vehicle definition (lumped aircraft for flight-path segments)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub name: String,
    pub mass: f64,                // kg, constant over a segment
    pub reference_area: f64,      // m^2
    pub zero_lift_drag: f64,      // CD0
    pub induced_drag_factor: f64, // k in CD = CD0 + k CL^2
    pub lift_curve_slope: f64,    // per rad
    pub max_thrust: f64,          // N
}

impl Vehicle {
    pub fn weight(&self) -> f64 {
        self.mass * G0
    }

    pub fn thrust_to_weight(&self) -> f64 {
        self.max_thrust / self.weight()
    }

    pub fn wing_loading(&self) -> f64 {
        self.mass / self.reference_area
    }

    /// Best lift-to-drag ratio of the parabolic polar.
    pub fn max_lift_to_drag(&self) -> f64 {
        0.5 / (self.zero_lift_drag * self.induced_drag_factor).sqrt()
    }

    pub fn drag_polar(&self) -> DragPolar {
        DragPolar {
            zero_lift_drag: self.zero_lift_drag,
            induced_drag_factor: self.induced_drag_factor,
            lift_curve_slope: self.lift_curve_slope,
            reference_area: self.reference_area,
        }
    }

    pub fn propulsion(&self) -> ConstantThrust {
        ConstantThrust {
            max_thrust: self.max_thrust,
        }
    }
}

// ---------------------------------------------------------------------------
// Vehicle builder
// ---------------------------------------------------------------------------

pub struct VehicleBuilder {
    name: String,
    mass: f64,
    reference_area: f64,
    zero_lift_drag: f64,
    induced_drag_factor: f64,
    lift_curve_slope: f64,
    max_thrust: f64,
}

impl VehicleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mass: 1000.0,
            reference_area: 16.0,
            zero_lift_drag: 0.025,
            induced_drag_factor: 0.05,
            lift_curve_slope: 5.5,
            max_thrust: 4000.0,
        }
    }

    pub fn mass(mut self, v: f64) -> Self { self.mass = v; self }
    pub fn reference_area(mut self, v: f64) -> Self { self.reference_area = v; self }
    pub fn zero_lift_drag(mut self, v: f64) -> Self { self.zero_lift_drag = v; self }
    pub fn induced_drag_factor(mut self, v: f64) -> Self { self.induced_drag_factor = v; self }
    pub fn lift_curve_slope(mut self, v: f64) -> Self { self.lift_curve_slope = v; self }
    pub fn max_thrust(mut self, v: f64) -> Self { self.max_thrust = v; self }

    pub fn build(self) -> Vehicle {
        Vehicle {
            name: self.name,
            mass: self.mass,
            reference_area: self.reference_area,
            zero_lift_drag: self.zero_lift_drag,
            induced_drag_factor: self.induced_drag_factor,
            lift_curve_slope: self.lift_curve_slope,
            max_thrust: self.max_thrust,
        }
    }
}

// ---------------------------------------------------------------------------
// Preset vehicles
// ---------------------------------------------------------------------------

pub mod presets {
    use super::*;

    /// Four-seat piston trainer.
    pub fn trainer() -> Vehicle {
        VehicleBuilder::new("Trainer")
            .mass(1100.0)
            .reference_area(16.2)
            .zero_lift_drag(0.027)
            .induced_drag_factor(0.054)
            .lift_curve_slope(5.2)
            .max_thrust(3600.0)
            .build()
    }

    /// Light twin turboprop.
    pub fn commuter() -> Vehicle {
        VehicleBuilder::new("Commuter")
            .mass(5700.0)
            .reference_area(28.0)
            .zero_lift_drag(0.024)
            .induced_drag_factor(0.045)
            .lift_curve_slope(5.6)
            .max_thrust(18_000.0)
            .build()
    }
}
