use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::segment::Segment;

/// Parts of a segment's state a step may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Numerics,
    Conditions,
    Unknowns,
    Residuals,
    Initials,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Numerics,
        Region::Conditions,
        Region::Unknowns,
        Region::Residuals,
        Region::Initials,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Region::Numerics => "numerics",
            Region::Conditions => "conditions",
            Region::Unknowns => "unknowns",
            Region::Residuals => "residuals",
            Region::Initials => "initials",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The callable installed in a process slot.
pub type StepFn = dyn Fn(&mut Segment) -> Result<()> + Send + Sync;

/// One slot of a process pipeline.
///
/// Every step may read the whole segment. Writes are declared up front and
/// checked against the phase the step is installed in when the segment is
/// validated; nothing is enforced while the step runs.
#[derive(Clone)]
pub enum Step {
    /// Intentionally does nothing.
    Skip,
    /// A slot a more specific configuration must bind before evaluation.
    Unbound,
    Call {
        writes: Vec<Region>,
        f: Arc<StepFn>,
    },
}

impl Step {
    pub fn new<F>(writes: &[Region], f: F) -> Self
    where
        F: Fn(&mut Segment) -> Result<()> + Send + Sync + 'static,
    {
        let mut writes = writes.to_vec();
        writes.sort();
        writes.dedup();
        Step::Call {
            writes,
            f: Arc::new(f),
        }
    }

    /// A step that only writes `state.conditions`.
    pub fn conditions<F>(f: F) -> Self
    where
        F: Fn(&mut Segment) -> Result<()> + Send + Sync + 'static,
    {
        Step::new(&[Region::Conditions], f)
    }

    pub fn writes(&self) -> &[Region] {
        match self {
            Step::Call { writes, .. } => writes,
            Step::Skip | Step::Unbound => &[],
        }
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, Step::Unbound)
    }

    pub(crate) fn call(&self, segment: &mut Segment) -> Result<()> {
        match self {
            Step::Call { f, .. } => f(segment),
            Step::Skip | Step::Unbound => Ok(()),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Skip => f.write_str("Skip"),
            Step::Unbound => f.write_str("Unbound"),
            Step::Call { writes, .. } => f.debug_struct("Call").field("writes", writes).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_sorted_and_unique() {
        let step = Step::new(
            &[Region::Residuals, Region::Conditions, Region::Residuals],
            |_| Ok(()),
        );
        assert_eq!(step.writes(), &[Region::Conditions, Region::Residuals]);
    }

    #[test]
    fn placeholders_write_nothing() {
        assert!(Step::Skip.writes().is_empty());
        assert!(Step::Unbound.is_unbound());
        assert!(!Step::Skip.is_unbound());
    }

    #[test]
    fn debug_hides_the_callable() {
        let step = Step::conditions(|_| Ok(()));
        assert_eq!(format!("{step:?}"), "Call { writes: [Conditions] }");
    }
}
