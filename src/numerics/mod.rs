//! Collocation discretization owned by each segment.

pub mod chebyshev;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::NumericsError;

pub use chebyshev::chebyshev_data;

/// Placement of collocation nodes over normalized time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spacing {
    #[default]
    Cosine,
    Linear,
}

/// Output of a discretization method.
#[derive(Debug, Clone, PartialEq)]
pub struct Discretization {
    pub nodes: DVector<f64>,
    pub differentiate: DMatrix<f64>,
    /// `None` when integration was not requested.
    pub integrate: Option<DMatrix<f64>>,
}

/// `(n, spacing, calculate_integration) -> (nodes, D, I)`.
pub type DiscretizationMethod =
    fn(usize, Spacing, bool) -> Result<Discretization, NumericsError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NumericsConfig {
    pub number_of_control_points: usize,
    pub control_point_spacing: Spacing,
    /// Skip building `I` when no step integrates.
    pub calculate_integration: bool,
    pub discretization_method: DiscretizationMethod,
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            number_of_control_points: 16,
            control_point_spacing: Spacing::Cosine,
            calculate_integration: true,
            discretization_method: chebyshev_data,
        }
    }
}

// ---------------------------------------------------------------------------
// Numerics state
// ---------------------------------------------------------------------------

/// Collocation points with their differentiation and integration operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Operators {
    pub control_points: DVector<f64>,
    pub differentiate: DMatrix<f64>,
    pub integrate: Option<DMatrix<f64>>,
}

impl Default for Operators {
    fn default() -> Self {
        Self {
            control_points: DVector::zeros(0),
            differentiate: DMatrix::zeros(0, 0),
            integrate: None,
        }
    }
}

impl Operators {
    pub fn integrate(&self) -> Result<&DMatrix<f64>, NumericsError> {
        self.integrate
            .as_ref()
            .ok_or(NumericsError::IntegrationNotBuilt)
    }
}

#[derive(Debug, Clone)]
pub struct Numerics {
    pub config: NumericsConfig,
    /// Operators over normalized time `[0, 1]`.
    pub dimensionless: Operators,
    /// Operators over physical time, rebuilt whenever the duration changes.
    pub time: Operators,
    pub converged: bool,
    pub evaluations: usize,
    pub jacobian_evaluations: usize,
    /// `max |residual|` at the returned solution.
    pub final_residual: f64,
    built_for: Option<(usize, Spacing, bool)>,
}

impl Numerics {
    pub fn new(config: NumericsConfig) -> Self {
        Self {
            config,
            dimensionless: Operators::default(),
            time: Operators::default(),
            converged: false,
            evaluations: 0,
            jacobian_evaluations: 0,
            final_residual: f64::NAN,
            built_for: None,
        }
    }

    pub fn number_of_control_points(&self) -> usize {
        self.config.number_of_control_points
    }

    /// Build dimensionless operators for the configured resolution.
    ///
    /// Returns `false` without recomputing when nothing changed since the
    /// last build.
    pub fn discretize(&mut self) -> Result<bool, NumericsError> {
        let key = (
            self.config.number_of_control_points,
            self.config.control_point_spacing,
            self.config.calculate_integration,
        );
        if self.built_for == Some(key) {
            return Ok(false);
        }

        let data = (self.config.discretization_method)(key.0, key.1, key.2)?;
        debug!(
            control_points = key.0,
            spacing = ?key.1,
            integration = key.2,
            "built collocation operators"
        );
        self.dimensionless = Operators {
            control_points: data.nodes,
            differentiate: data.differentiate,
            integrate: data.integrate,
        };
        self.built_for = Some(key);
        Ok(true)
    }

    /// Scale the dimensionless operators onto `[t0, t0 + duration]`.
    pub fn update_time_operators(&mut self, t0: f64, duration: f64) {
        if duration.abs() < f64::EPSILON {
            warn!(duration, "segment duration is zero; time operators are singular");
        }
        let d = &self.dimensionless;
        self.time = Operators {
            control_points: d.control_points.map(|x| t0 + duration * x),
            differentiate: &d.differentiate / duration,
            integrate: d.integrate.as_ref().map(|i| i * duration),
        };
    }

    pub fn reset_solution(&mut self) {
        self.converged = false;
        self.evaluations = 0;
        self.jacobian_evaluations = 0;
        self.final_residual = f64::NAN;
    }
}

impl Default for Numerics {
    fn default() -> Self {
        Self::new(NumericsConfig::default())
    }
}
