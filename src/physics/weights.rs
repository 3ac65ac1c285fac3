use crate::process::Step;
use crate::segment::common::{initial_value, TOTAL_MASS};
use crate::segment::Segment;

/// Constant mass: the preceding segment's final mass when there is one,
/// otherwise `mass`.
pub fn constant_mass(mass: f64) -> Step {
    Step::conditions(move |seg: &mut Segment| {
        let m = initial_value(seg, TOTAL_MASS, 0)
            .filter(|m| *m > 0.0)
            .unwrap_or(mass);
        let c = &mut seg.state.conditions;
        c.set_filled(TOTAL_MASS, m, 1)?;
        c.set_filled("weights.vehicle_mass_rate", 0.0, 1)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::presets;
    use crate::segment::SegmentBuilder;

    #[test]
    fn inherits_mass_from_initials() {
        let mut previous = presets::basic();
        previous.set_scalar(TOTAL_MASS, 950.0).unwrap();
        let mut seg = SegmentBuilder::new("w")
            .conditions(presets::basic())
            .initials(previous.last_row())
            .build();
        constant_mass(1000.0).call(&mut seg).unwrap();
        assert_eq!(seg.state.conditions.column(TOTAL_MASS).unwrap()[0], 950.0);

        seg.state.initials = None;
        constant_mass(1000.0).call(&mut seg).unwrap();
        assert_eq!(seg.state.conditions.column(TOTAL_MASS).unwrap()[0], 1000.0);
    }
}
