use tracing::trace;

use super::step::Step;
use crate::error::{ConfigError, Result};
use crate::segment::Segment;

/// A pipeline slot: a step or a nested sub-pipeline.
#[derive(Debug, Clone)]
pub enum Entry {
    Step(Step),
    Nested(Pipeline),
}

impl From<Step> for Entry {
    fn from(step: Step) -> Self {
        Entry::Step(step)
    }
}

impl From<Pipeline> for Entry {
    fn from(pipeline: Pipeline) -> Self {
        Entry::Nested(pipeline)
    }
}

/// Ordered, named steps. Names are unique within one level; nested
/// pipelines are addressed with dotted paths (`"aerodynamics.drag"`).
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    entries: Vec<(String, Entry)>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent append (or in-place replacement) of a step.
    pub fn step(mut self, name: &str, step: Step) -> Self {
        self.upsert(name, Entry::Step(step));
        self
    }

    /// Fluent append (or in-place replacement) of a sub-pipeline.
    pub fn nested(mut self, name: &str, pipeline: Pipeline) -> Self {
        self.upsert(name, Entry::Nested(pipeline));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot names at this level, in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        match path.split_once('.') {
            None => self.local(path),
            Some((head, rest)) => match self.local(head)? {
                Entry::Nested(p) => p.get(rest),
                Entry::Step(_) => None,
            },
        }
    }

    /// Rebind an existing slot. Its position in the order is kept.
    pub fn set(&mut self, path: &str, entry: impl Into<Entry>) -> Result<(), ConfigError> {
        let (owner, name) = self.owner_mut(path)?;
        match owner.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, slot)) => {
                *slot = entry.into();
                Ok(())
            }
            None => Err(ConfigError::UnknownSlot(path.into())),
        }
    }

    /// Bind a slot, appending it to its owner when it does not exist yet.
    pub fn insert(&mut self, path: &str, entry: impl Into<Entry>) -> Result<(), ConfigError> {
        let (owner, name) = self.owner_mut(path)?;
        owner.upsert(name, entry.into());
        Ok(())
    }

    /// Insert a new slot immediately before `before` at the same level.
    pub fn insert_before(
        &mut self,
        before: &str,
        name: &str,
        entry: impl Into<Entry>,
    ) -> Result<(), ConfigError> {
        let (owner, anchor) = self.owner_mut(before)?;
        if anchor == name || owner.position(anchor).is_none() {
            return Err(ConfigError::UnknownSlot(before.into()));
        }
        owner.remove_local(name);
        let idx = owner.position(anchor).unwrap_or(owner.entries.len());
        owner.entries.insert(idx, (name.to_string(), entry.into()));
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Result<Entry, ConfigError> {
        let (owner, name) = self.owner_mut(path)?;
        owner
            .remove_local(name)
            .ok_or_else(|| ConfigError::UnknownSlot(path.into()))
    }

    /// Visit every step depth first with its dotted path under `prefix`.
    pub fn walk<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(&str, &'a Step)) {
        for (name, entry) in &self.entries {
            let path = format!("{prefix}.{name}");
            match entry {
                Entry::Step(step) => visit(&path, step),
                Entry::Nested(p) => p.walk(&path, visit),
            }
        }
    }

    /// Run every step in order. The first failing step aborts the run.
    pub fn run(&self, segment: &mut Segment, prefix: &str) -> Result<()> {
        for (name, entry) in &self.entries {
            match entry {
                Entry::Step(Step::Unbound) => {
                    return Err(ConfigError::UnboundSlot(format!("{prefix}.{name}")).into());
                }
                Entry::Step(step) => {
                    trace!(prefix, step = name.as_str(), "running step");
                    step.call(segment)?;
                }
                Entry::Nested(p) => p.run(segment, &format!("{prefix}.{name}"))?,
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == name)
    }

    fn local(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn upsert(&mut self, name: &str, entry: Entry) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = entry,
            None => self.entries.push((name.to_string(), entry)),
        }
    }

    fn remove_local(&mut self, name: &str) -> Option<Entry> {
        let i = self.position(name)?;
        Some(self.entries.remove(i).1)
    }

    fn owner_mut<'p>(&mut self, path: &'p str) -> Result<(&mut Pipeline, &'p str), ConfigError> {
        let Some((parent, name)) = path.rsplit_once('.') else {
            return Ok((self, path));
        };
        let mut owner = self;
        for part in parent.split('.') {
            owner = match owner.entries.iter_mut().find(|(k, _)| k == part) {
                Some((_, Entry::Nested(p))) => p,
                _ => return Err(ConfigError::UnknownSlot(path.into())),
            };
        }
        Ok((owner, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Step {
        Step::conditions(|_| Ok(()))
    }

    fn sample() -> Pipeline {
        Pipeline::new()
            .step("atmosphere", noop())
            .nested(
                "aerodynamics",
                Pipeline::new().step("lift", Step::Skip).step("drag", Step::Unbound),
            )
            .step("forces", noop())
    }

    fn paths(p: &Pipeline) -> Vec<String> {
        let mut out = Vec::new();
        p.walk("conditions", &mut |path, _| out.push(path.to_string()));
        out
    }

    #[test]
    fn walk_is_depth_first_in_declaration_order() {
        assert_eq!(
            paths(&sample()),
            vec![
                "conditions.atmosphere",
                "conditions.aerodynamics.lift",
                "conditions.aerodynamics.drag",
                "conditions.forces",
            ]
        );
    }

    #[test]
    fn set_keeps_position() {
        let mut p = sample();
        p.set("aerodynamics.drag", noop()).unwrap();
        assert!(matches!(
            p.get("aerodynamics.drag"),
            Some(Entry::Step(Step::Call { .. }))
        ));
        assert_eq!(paths(&p)[2], "conditions.aerodynamics.drag");
    }

    #[test]
    fn set_rejects_unknown_slots() {
        let mut p = sample();
        assert_eq!(
            p.set("aerodynamics.moment", noop()).unwrap_err(),
            ConfigError::UnknownSlot("aerodynamics.moment".into())
        );
        assert_eq!(
            p.set("missing.drag", noop()).unwrap_err(),
            ConfigError::UnknownSlot("missing.drag".into())
        );
    }

    #[test]
    fn insert_appends_and_insert_before_orders() {
        let mut p = sample();
        p.insert("weights", noop()).unwrap();
        p.insert_before("atmosphere", "time", noop()).unwrap();
        let names: Vec<&str> = p.names().collect();
        assert_eq!(names, vec!["time", "atmosphere", "aerodynamics", "forces", "weights"]);
    }

    #[test]
    fn remove_returns_the_entry() {
        let mut p = sample();
        assert!(matches!(p.remove("aerodynamics"), Ok(Entry::Nested(_))));
        assert_eq!(p.len(), 2);
        assert!(p.remove("aerodynamics").is_err());
    }
}
