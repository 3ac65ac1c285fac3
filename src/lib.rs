pub mod conditions;
pub mod error;
pub mod mission;
pub mod numerics;
pub mod phases;
pub mod physics;
pub mod process;
pub mod segment;
pub mod solver;
pub mod vehicle;

pub use conditions::Conditions;
pub use error::{ConditionsError, ConfigError, NumericsError, Result, SegmentError};
pub use mission::{Mission, MissionBuilder, MissionResults};
pub use process::{Pipeline, Process, Region, Step};
pub use segment::{Parameters, Segment, SegmentBuilder, SegmentStatus};
pub use solver::{SolverConfig, SolverMethod};
