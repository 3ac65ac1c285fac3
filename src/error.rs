use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors raised while addressing or unpacking a condition tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionsError {
    /// No node exists at the requested dotted path.
    #[error("no condition at `{0}`")]
    Missing(String),

    /// A node exists but holds a different kind of value.
    #[error("condition `{path}` is not a {expected}")]
    WrongKind { path: String, expected: &'static str },

    /// The flat vector handed to `unpack_array` does not match the tree.
    #[error("cannot unpack {given} values into a tree holding {expected}")]
    UnpackLength { expected: usize, given: usize },
}

/// Errors raised while building collocation operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericsError {
    #[error("at least 2 control points are required, got {0}")]
    TooFewControlPoints(usize),

    #[error("collocation nodes must be distinct (node {0} repeats)")]
    RepeatedNode(usize),

    /// The interior block of the differentiation matrix could not be inverted.
    #[error("integration operator is singular for {0} control points")]
    SingularIntegration(usize),

    #[error("integration operator was not built (calculate_integration is off)")]
    IntegrationNotBuilt,
}

/// Mis-assembled segments. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknowns pack to {unknowns} values but residuals pack to {residuals}")]
    UnknownResidualMismatch { unknowns: usize, residuals: usize },

    #[error("segment has no unknowns to solve for")]
    NoUnknowns,

    #[error("process slot `{0}` is an unbound placeholder")]
    UnboundSlot(String),

    #[error("process slot `{0}` does not exist")]
    UnknownSlot(String),

    #[error("step `{step}` writes {region} but phase `{phase}` only permits {permitted}")]
    CapabilityViolation {
        step: String,
        phase: String,
        region: String,
        permitted: String,
    },

    #[error("boundary parameter `{0}` is not set")]
    MissingParameter(String),
}

/// Top-level error returned by `Segment::evaluate` and the mission drivers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error(transparent)]
    Conditions(#[from] ConditionsError),

    #[error(transparent)]
    Numerics(#[from] NumericsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A domain callable installed in a process slot failed.
    #[error("step `{step}` failed: {message}")]
    Step { step: String, message: String },
}

impl SegmentError {
    /// Convenience constructor for domain callables.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        SegmentError::Step {
            step: step.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = SegmentError> = std::result::Result<T, E>;
