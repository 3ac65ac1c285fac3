//! The composition root: one flight phase solved as a boundary-value problem.

pub mod common;

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::conditions::Conditions;
use crate::error::{ConfigError, Result};
use crate::numerics::{Numerics, NumericsConfig};
use crate::process::Process;
use crate::solver::SolverConfig;

// ---------------------------------------------------------------------------
// Boundary parameters
// ---------------------------------------------------------------------------

/// Named scalar boundary values (`altitude_start`, `climb_rate`, ...),
/// fixed for the duration of one solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, f64>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent insertion.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Result<f64, ConfigError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::MissingParameter(name.into()))
    }

    /// `default` when the parameter is absent.
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ---------------------------------------------------------------------------
// Segment state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct State {
    pub numerics: Numerics,
    pub conditions: Conditions,
    pub unknowns: Conditions,
    pub residuals: Conditions,
    /// Single-row conditions handed over by the preceding segment.
    pub initials: Option<Conditions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentStatus {
    #[default]
    Uninitialized,
    Initialized,
    Converging,
    Converged,
    NotConverged,
    Finalized {
        converged: bool,
    },
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentStatus::Uninitialized => f.write_str("uninitialized"),
            SegmentStatus::Initialized => f.write_str("initialized"),
            SegmentStatus::Converging => f.write_str("converging"),
            SegmentStatus::Converged => f.write_str("converged"),
            SegmentStatus::NotConverged => f.write_str("not-converged"),
            SegmentStatus::Finalized { converged: true } => f.write_str("finalized"),
            SegmentStatus::Finalized { converged: false } => {
                f.write_str("not-converged+finalized")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One flight phase: state, boundary parameters and the process that
/// solves it. Behavior is entirely the steps bound into `process`.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub name: String,
    pub parameters: Parameters,
    pub state: State,
    pub process: Process,
    pub solver: SolverConfig,
    status: SegmentStatus,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn converged(&self) -> bool {
        self.state.numerics.converged
    }

    /// Shorthand for `self.parameters.get(name)`.
    pub fn parameter(&self, name: &str) -> Result<f64> {
        Ok(self.parameters.get(name)?)
    }

    /// Run `initialize`, `converge` and `finalize` in order.
    ///
    /// Configuration problems fail before any step runs or, for packing
    /// mismatches, right after `initialize`. Non-convergence is not an
    /// error: `finalize` still runs and [`converged`](Self::converged)
    /// reports `false`.
    pub fn evaluate(&mut self) -> Result<&Conditions> {
        let process = self.process.clone();
        process.validate()?;

        self.state.numerics.reset_solution();
        self.transition(SegmentStatus::Uninitialized);

        process.initialize.run(self, "initialize")?;
        if !process.converge.is_empty() {
            self.check_packing()?;
        }
        self.transition(SegmentStatus::Initialized);

        self.transition(SegmentStatus::Converging);
        process.converge.run(self, "converge")?;
        let converged = self.state.numerics.converged;
        if converged {
            self.transition(SegmentStatus::Converged);
        } else {
            warn!(
                segment = %self.name,
                evaluations = self.state.numerics.evaluations,
                max_residual = self.state.numerics.final_residual,
                "segment did not converge"
            );
            self.transition(SegmentStatus::NotConverged);
        }

        process.finalize.run(self, "finalize")?;
        self.transition(SegmentStatus::Finalized { converged });

        info!(
            segment = %self.name,
            converged,
            evaluations = self.state.numerics.evaluations,
            max_residual = self.state.numerics.final_residual,
            "segment evaluated"
        );
        Ok(&self.state.conditions)
    }

    fn check_packing(&self) -> Result<(), ConfigError> {
        let unknowns = self.state.unknowns.packed_len();
        let residuals = self.state.residuals.packed_len();
        if unknowns == 0 {
            return Err(ConfigError::NoUnknowns);
        }
        if unknowns != residuals {
            return Err(ConfigError::UnknownResidualMismatch {
                unknowns,
                residuals,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: SegmentStatus) {
        if self.status != next {
            debug!(segment = %self.name, from = %self.status, to = %next, "segment state");
            self.status = next;
        }
    }
}

// ---------------------------------------------------------------------------
// Segment builder
// ---------------------------------------------------------------------------

pub struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            segment: Segment::new(name),
        }
    }

    pub fn parameter(mut self, name: &str, value: f64) -> Self {
        self.segment.parameters.set(name, value);
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.segment.parameters = parameters;
        self
    }

    pub fn control_points(mut self, n: usize) -> Self {
        self.segment.state.numerics.config.number_of_control_points = n;
        self
    }

    pub fn numerics(mut self, config: NumericsConfig) -> Self {
        self.segment.state.numerics = Numerics::new(config);
        self
    }

    pub fn solver(mut self, config: SolverConfig) -> Self {
        self.segment.solver = config;
        self
    }

    pub fn conditions(mut self, tree: Conditions) -> Self {
        self.segment.state.conditions = tree;
        self
    }

    pub fn unknowns(mut self, tree: Conditions) -> Self {
        self.segment.state.unknowns = tree;
        self
    }

    pub fn residuals(mut self, tree: Conditions) -> Self {
        self.segment.state.residuals = tree;
        self
    }

    pub fn initials(mut self, tree: Conditions) -> Self {
        self.segment.state.initials = Some(tree);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.segment.process = process;
        self
    }

    pub fn build(self) -> Segment {
        self.segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use crate::process::{Pipeline, Region, Step};

    fn linear_segment() -> Segment {
        // x - 3 = 0 at every collocation point
        let mut process = Process::new();
        process.initialize = Pipeline::new().step("expand_state", common::expand_state());
        process.converge = Pipeline::new().step("converge_root", common::converge_root());
        process.iterate.residuals = Pipeline::new().step(
            "offset",
            Step::new(&[Region::Residuals], |seg: &mut Segment| {
                let x = seg.state.unknowns.array("x")?.add_scalar(-3.0);
                seg.state.residuals.set_array("r", x)?;
                Ok(())
            }),
        );
        SegmentBuilder::new("linear")
            .control_points(4)
            .unknowns(Conditions::new().leaf("x", 1))
            .residuals(Conditions::new().leaf("r", 1))
            .process(process)
            .build()
    }

    #[test]
    fn evaluate_walks_the_state_machine() {
        let mut seg = linear_segment();
        assert_eq!(seg.status(), SegmentStatus::Uninitialized);
        seg.evaluate().unwrap();
        assert!(seg.converged());
        assert_eq!(seg.status(), SegmentStatus::Finalized { converged: true });
        assert_eq!(seg.status().to_string(), "finalized");
        let x = seg.state.unknowns.array("x").unwrap();
        assert!(x.iter().all(|v| (v - 3.0).abs() < 1e-8));
    }

    #[test]
    fn mismatched_packing_fails_after_initialize() {
        let mut seg = linear_segment();
        seg.state.residuals = Conditions::new().leaf("r", 2);
        assert_eq!(
            seg.evaluate().unwrap_err(),
            SegmentError::from(ConfigError::UnknownResidualMismatch {
                unknowns: 4,
                residuals: 8
            })
        );
        assert_eq!(seg.status(), SegmentStatus::Uninitialized);
    }

    #[test]
    fn step_errors_propagate_out_of_evaluate() {
        let mut seg = linear_segment();
        seg.process
            .insert(
                "finalize.explode",
                Step::conditions(|_| Err(SegmentError::step("explode", "unphysical"))),
            )
            .unwrap();
        let err = seg.evaluate().unwrap_err();
        assert_eq!(err, SegmentError::step("explode", "unphysical"));
        assert_eq!(seg.status(), SegmentStatus::Converged);
    }

    #[test]
    fn missing_parameter_is_reported() {
        let seg = Segment::new("empty");
        assert_eq!(
            seg.parameter("climb_rate").unwrap_err(),
            SegmentError::from(ConfigError::MissingParameter("climb_rate".into()))
        );
        let p = Parameters::new().with("b", 2.0).with("a", 1.0);
        assert_eq!(p.get_or("c", 7.0), 7.0);
        let names: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
