//! Named, ordered steps applied to a segment.
//!
//! A [`Process`] has four fixed phases, `initialize`, `converge`, `iterate`
//! and `finalize`; `iterate` in turn has four fixed sub-phases, `initials`,
//! `unknowns`, `conditions` and `residuals`. Flight-phase behavior is the
//! set of steps bound into those slots.

pub mod pipeline;
pub mod step;

use crate::error::{ConfigError, Result};
use crate::segment::Segment;

pub use pipeline::{Entry, Pipeline};
pub use step::{Region, Step, StepFn};

// ---------------------------------------------------------------------------
// Write permissions per phase
// ---------------------------------------------------------------------------

const ITERATE_STATE: &[Region] = &[Region::Numerics, Region::Conditions];

/// Regions a step installed in `phase` may write.
///
/// Only `initialize` seeds unknowns and initials; inside the solve loop the
/// unknowns belong to the solver.
pub fn permitted_writes(phase: &str) -> &'static [Region] {
    match phase {
        "initialize" => &Region::ALL,
        "converge" => &[
            Region::Numerics,
            Region::Conditions,
            Region::Unknowns,
            Region::Residuals,
        ],
        "iterate.residuals" => &[Region::Residuals],
        "iterate.initials" | "iterate.unknowns" | "iterate.conditions" => ITERATE_STATE,
        "finalize" => ITERATE_STATE,
        _ => &[],
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// The solve loop body, run once per residual evaluation.
#[derive(Debug, Clone, Default)]
pub struct Iterate {
    pub initials: Pipeline,
    pub unknowns: Pipeline,
    pub conditions: Pipeline,
    pub residuals: Pipeline,
}

impl Iterate {
    pub fn run(&self, segment: &mut Segment) -> Result<()> {
        self.initials.run(segment, "iterate.initials")?;
        self.unknowns.run(segment, "iterate.unknowns")?;
        self.conditions.run(segment, "iterate.conditions")?;
        self.residuals.run(segment, "iterate.residuals")
    }

    pub fn phase_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        match name {
            "initials" => Some(&mut self.initials),
            "unknowns" => Some(&mut self.unknowns),
            "conditions" => Some(&mut self.conditions),
            "residuals" => Some(&mut self.residuals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Process {
    pub initialize: Pipeline,
    pub converge: Pipeline,
    pub iterate: Iterate,
    pub finalize: Pipeline,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every phase with its dotted name, in execution order.
    pub fn phases(&self) -> [(&'static str, &Pipeline); 7] {
        [
            ("initialize", &self.initialize),
            ("converge", &self.converge),
            ("iterate.initials", &self.iterate.initials),
            ("iterate.unknowns", &self.iterate.unknowns),
            ("iterate.conditions", &self.iterate.conditions),
            ("iterate.residuals", &self.iterate.residuals),
            ("finalize", &self.finalize),
        ]
    }

    /// The pipeline of a phase (`"finalize"`, `"iterate.conditions"`, ...).
    pub fn phase_mut(&mut self, phase: &str) -> Result<&mut Pipeline, ConfigError> {
        let pipeline = match phase.split_once('.') {
            None => match phase {
                "initialize" => Some(&mut self.initialize),
                "converge" => Some(&mut self.converge),
                "finalize" => Some(&mut self.finalize),
                _ => None,
            },
            Some(("iterate", sub)) => self.iterate.phase_mut(sub),
            Some(_) => None,
        };
        pipeline.ok_or_else(|| ConfigError::UnknownSlot(phase.into()))
    }

    /// Rebind an existing slot, e.g. `"iterate.conditions.aerodynamics"`.
    pub fn set(&mut self, path: &str, entry: impl Into<Entry>) -> Result<(), ConfigError> {
        let (phase, slot) = split_slot(path)?;
        self.phase_mut(phase)?
            .set(slot, entry)
            .map_err(|_| ConfigError::UnknownSlot(path.into()))
    }

    /// Bind a slot, appending it when it does not exist yet.
    pub fn insert(&mut self, path: &str, entry: impl Into<Entry>) -> Result<(), ConfigError> {
        let (phase, slot) = split_slot(path)?;
        self.phase_mut(phase)?
            .insert(slot, entry)
            .map_err(|_| ConfigError::UnknownSlot(path.into()))
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        let (phase, slot) = split_slot(path).ok()?;
        self.phases()
            .into_iter()
            .find(|(name, _)| *name == phase)
            .and_then(|(_, p)| p.get(slot))
    }

    /// Check the assembled process before anything runs.
    ///
    /// Fails on the first unbound placeholder, or on a step declaring a
    /// write its phase does not permit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut error = None;
        for (phase, pipeline) in self.phases() {
            let permitted = permitted_writes(phase);
            pipeline.walk(phase, &mut |path, step| {
                if error.is_some() {
                    return;
                }
                if step.is_unbound() {
                    error = Some(ConfigError::UnboundSlot(path.to_string()));
                    return;
                }
                if let Some(region) = step.writes().iter().find(|&&r| !permitted.contains(&r)) {
                    error = Some(ConfigError::CapabilityViolation {
                        step: path.to_string(),
                        phase: phase.to_string(),
                        region: region.to_string(),
                        permitted: describe(permitted),
                    });
                }
            });
            if let Some(e) = error.take() {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// `"iterate.conditions.weights"` -> `("iterate.conditions", "weights")`.
fn split_slot(path: &str) -> Result<(&str, &str), ConfigError> {
    let unknown = || ConfigError::UnknownSlot(path.into());
    let (head, rest) = path.split_once('.').ok_or_else(unknown)?;
    if head != "iterate" {
        return Ok((head, rest));
    }
    let (sub, slot) = rest.split_once('.').ok_or_else(unknown)?;
    Ok((&path[..head.len() + 1 + sub.len()], slot))
}

fn describe(regions: &[Region]) -> String {
    if regions.is_empty() {
        return "nothing".into();
    }
    regions
        .iter()
        .map(|r| r.name())
        .collect::<Vec<_>>()
        .join(", ")
}
