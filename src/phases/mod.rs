//! Flight-phase configurations: functions that bind steps into process
//! slots and return a ready-to-evaluate [`Segment`].

pub mod climb;
pub mod cruise;

use nalgebra::DMatrix;

use crate::conditions::{presets, Conditions};
use crate::physics::{self, atmosphere, gravity};
use crate::process::{Pipeline, Process, Region, Step};
use crate::segment::{common, Segment, SegmentBuilder};

/// The process every flight phase starts from.
///
/// `weights`, `aerodynamics` and `propulsion` are left unbound; a
/// configuration must bind them (possibly to [`Step::Skip`]).
pub fn base_process(required: &'static [&'static str]) -> Process {
    let mut p = Process::new();
    p.initialize = Pipeline::new()
        .step("parameters", common::require_parameters(required))
        .step("expand_state", common::expand_state())
        .step("differentials", common::dimensionless_operators());
    p.converge = Pipeline::new().step("converge_root", common::converge_root());
    p.iterate.initials = Pipeline::new().step("initials", common::seed_initials());
    p.iterate.conditions = Pipeline::new()
        .step("atmosphere", atmosphere::update_atmosphere())
        .step("weights", Step::Unbound)
        .step("gravity", gravity::update_gravity())
        .step("aerodynamics", Step::Unbound)
        .step("propulsion", Step::Unbound)
        .step("forces", physics::update_forces());
    p.finalize = Pipeline::new()
        .step("position", common::integrate_position())
        .step("energy", common::update_energy());
    p
}

/// A segment whose residual is a nonzero constant whatever the unknowns.
///
/// It can never converge; the solver spends its whole budget on it.
pub fn sink(name: &str, control_points: usize) -> Segment {
    let mut process = Process::new();
    process.initialize = Pipeline::new()
        .step("expand_state", common::expand_state())
        .step("differentials", common::dimensionless_operators());
    process.converge = Pipeline::new().step("converge_root", common::converge_root());
    process.iterate.residuals = Pipeline::new().step(
        "constant",
        Step::new(&[Region::Residuals], |seg: &mut Segment| {
            let rows = seg.state.residuals.rows();
            seg.state
                .residuals
                .set_array("offset", DMatrix::from_element(rows, 1, 1.0))?;
            Ok(())
        }),
    );
    process.finalize = Pipeline::new().step("time", common::integrate_time());

    SegmentBuilder::new(name)
        .control_points(control_points)
        .conditions(presets::basic())
        .unknowns(Conditions::new().leaf("x", 1))
        .residuals(Conditions::new().leaf("offset", 1))
        .process(process)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::solver::SolverConfig;

    #[test]
    fn base_process_requires_bindings() {
        let err = base_process(&[]).validate().unwrap_err();
        assert_eq!(err, ConfigError::UnboundSlot("iterate.conditions.weights".into()));
    }

    #[test]
    fn sink_spends_the_whole_budget() {
        let mut seg = sink("sink", 4);
        seg.solver = SolverConfig {
            max_evaluations: 25,
            ..SolverConfig::default()
        };
        seg.evaluate().unwrap();
        assert!(!seg.converged());
        assert_eq!(seg.state.numerics.evaluations, 25);
        assert_eq!(seg.state.numerics.final_residual, 1.0);
    }
}
