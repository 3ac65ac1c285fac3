use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::segment::common::{POSITION, TIME};
use crate::segment::Segment;

// ---------------------------------------------------------------------------
// Mission: ordered sequence of segments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Mission {
    pub name: String,
    pub segments: Vec<Segment>,
}

/// Outcome of one evaluated segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub name: String,
    pub converged: bool,
    pub evaluations: usize,
    pub max_residual: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub final_altitude: f64,
    pub final_range: f64,
}

impl SegmentSummary {
    pub fn from_segment(segment: &Segment) -> Self {
        let c = &segment.state.conditions;
        let last = |path: &str, column: usize| {
            c.array(path)
                .ok()
                .filter(|m| m.nrows() > 0 && m.ncols() > column)
                .map(|m| (m[(0, column)], m[(m.nrows() - 1, column)]))
                .unwrap_or((0.0, 0.0))
        };
        let (start_time, end_time) = last(TIME, 0);
        let numerics = &segment.state.numerics;
        Self {
            name: segment.name.clone(),
            converged: numerics.converged,
            evaluations: numerics.evaluations,
            max_residual: numerics.final_residual,
            start_time,
            end_time,
            final_altitude: last(POSITION, 2).1,
            final_range: last(POSITION, 0).1,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionResults {
    pub segments: Vec<SegmentSummary>,
}

impl MissionResults {
    pub fn all_converged(&self) -> bool {
        self.segments.iter().all(|s| s.converged)
    }

    /// Names of segments whose outputs should not be trusted.
    pub fn not_converged(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|s| !s.converged)
            .map(|s| s.name.as_str())
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration()).sum()
    }
}

impl Mission {
    /// Evaluate every segment in order.
    ///
    /// Each segment after the first starts from the previous segment's final
    /// conditions row, and inherits its `altitude_end` as `altitude_start`
    /// when that parameter is unset. A non-converged segment is recorded and
    /// the mission carries on; errors abort the run.
    pub fn evaluate(&mut self) -> Result<MissionResults> {
        let mut results = MissionResults::default();
        for i in 0..self.segments.len() {
            let (done, rest) = self.segments.split_at_mut(i);
            let segment = &mut rest[0];
            if let Some(previous) = done.last() {
                hand_over(previous, segment);
            }
            segment.evaluate()?;
            let summary = SegmentSummary::from_segment(segment);
            if !summary.converged {
                warn!(mission = %self.name, segment = %summary.name, "segment flagged as not converged");
            }
            results.segments.push(summary);
        }

        info!(
            mission = %self.name,
            segments = results.segments.len(),
            converged = results.all_converged(),
            duration = results.total_duration(),
            "mission evaluated"
        );
        Ok(results)
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }
}

fn hand_over(previous: &Segment, next: &mut Segment) {
    next.state.initials = Some(previous.state.conditions.last_row());
    if !next.parameters.contains("altitude_start") {
        if let Ok(h) = previous.parameter("altitude_end") {
            next.parameters.set("altitude_start", h);
        }
    }
}

/// Evaluate independent segments in parallel. No initials are handed over;
/// each result is that segment's convergence flag.
pub fn evaluate_batch(segments: &mut [Segment]) -> Vec<Result<bool>> {
    segments
        .par_iter_mut()
        .map(|segment| -> Result<bool> {
            segment.evaluate()?;
            Ok(segment.converged())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Mission builder
// ---------------------------------------------------------------------------

pub struct MissionBuilder {
    name: String,
    segments: Vec<Segment>,
}

impl MissionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), segments: vec![] }
    }

    pub fn segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn build(self) -> Mission {
        Mission { name: self.name, segments: self.segments }
    }
}

// ---------------------------------------------------------------------------
// Preset missions
// ---------------------------------------------------------------------------

pub mod presets {
    use super::*;
    use crate::phases::{climb, cruise};
    use crate::segment::Parameters;
    use crate::vehicle::Vehicle;

    /// Climb from sea level to 1500 m, then cruise 50 km.
    pub fn climb_and_cruise(vehicle: &Vehicle) -> Result<Mission> {
        let climb = climb::constant_speed_constant_rate(
            "Climb",
            Parameters::new()
                .with("altitude_start", 0.0)
                .with("altitude_end", 1500.0)
                .with("air_speed", 60.0)
                .with("climb_rate", 3.0),
            vehicle,
        )?;
        let cruise = cruise::constant_speed_constant_altitude(
            "Cruise",
            Parameters::new()
                .with("altitude", 1500.0)
                .with("air_speed", 65.0)
                .with("distance", 50_000.0),
            vehicle,
        )?;
        Ok(MissionBuilder::new("Climb and cruise")
            .segment(climb)
            .segment(cruise)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{climb, sink};
    use crate::segment::Parameters;
    use crate::solver::SolverConfig;
    use approx::assert_relative_eq;

    fn vertical(name: &str, end: f64) -> Segment {
        climb::constant_rate(
            name,
            Parameters::new().with("altitude_end", end).with("climb_rate", 5.0),
        )
        .unwrap()
    }

    #[test]
    fn segments_chain_time_and_altitude() {
        let mut first = vertical("first", 1000.0);
        first.parameters.set("altitude_start", 0.0);
        let mut mission = MissionBuilder::new("stairs")
            .segment(first)
            .segment(vertical("second", 1500.0))
            .build();

        let results = mission.evaluate().unwrap();
        assert!(results.all_converged());
        let second = &results.segments[1];
        assert_relative_eq!(second.start_time, 200.0, max_relative = 1e-6);
        assert_relative_eq!(second.end_time, 300.0, max_relative = 1e-6);
        assert_relative_eq!(second.final_altitude, 1500.0, max_relative = 1e-9);
        assert_relative_eq!(results.total_duration(), 300.0, max_relative = 1e-6);
    }

    #[test]
    fn non_converged_segment_is_flagged_not_fatal() {
        let mut stuck = sink("stuck", 4);
        stuck.solver = SolverConfig {
            max_evaluations: 10,
            ..SolverConfig::default()
        };
        let mut mission = MissionBuilder::new("flagged").segment(stuck).build();
        let results = mission.evaluate().unwrap();
        assert!(!results.all_converged());
        assert_eq!(results.not_converged().collect::<Vec<_>>(), vec!["stuck"]);
    }

    #[test]
    fn batch_evaluation_matches_sequential() {
        let mut segments: Vec<Segment> = (1..=3)
            .map(|k| {
                let mut s = vertical(&format!("v{k}"), 500.0 * k as f64);
                s.parameters.set("altitude_start", 0.0);
                s
            })
            .collect();
        let flags = evaluate_batch(&mut segments);
        assert!(flags.iter().all(|f| matches!(f, Ok(true))));
        for (k, s) in segments.iter().enumerate() {
            let summary = SegmentSummary::from_segment(s);
            assert_relative_eq!(summary.duration(), 100.0 * (k + 1) as f64, max_relative = 1e-6);
        }
    }
}
