pub mod airframe;

pub use airframe::{presets, Vehicle, VehicleBuilder};
