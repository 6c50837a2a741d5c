use super::error::WorkflowError;
use super::registry::StepRegistry;
use super::step::StepId;
use std::collections::BTreeMap;

/// Steps that must run before aggregation, iterated in canonical universe order.
///
/// Members are keyed by universe position, so iteration order never depends
/// on insertion order and only ids from the universe can be held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredSet {
    members: BTreeMap<usize, StepId>,
}

impl RequiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step; returns false if it was already present
    pub fn insert(&mut self, registry: &StepRegistry, id: &StepId) -> Result<bool, WorkflowError> {
        let position = registry
            .position(id)
            .ok_or_else(|| WorkflowError::UnknownStep(id.clone()))?;
        Ok(self.members.insert(position, id.clone()).is_none())
    }

    pub fn from_ids<'a>(
        registry: &StepRegistry,
        ids: impl IntoIterator<Item = &'a StepId>,
    ) -> Result<Self, WorkflowError> {
        let mut set = Self::new();
        for id in ids {
            set.insert(registry, id)?;
        }
        Ok(set)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.members.values().any(|member| member == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepId> {
        self.members.values()
    }

    pub fn to_vec(&self) -> Vec<StepId> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<StepId> {
        names.iter().map(|n| StepId::new(*n)).collect()
    }

    #[test]
    fn test_iteration_follows_universe_order() {
        let registry = StepRegistry::builtin().unwrap();
        let forward = ids(&["dermatologist", "cardiologist", "gynecologist"]);
        let set = RequiredSet::from_ids(&registry, &forward).unwrap();

        assert_eq!(
            set.to_vec(),
            ids(&["gynecologist", "cardiologist", "dermatologist"])
        );
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let registry = StepRegistry::builtin().unwrap();
        let a = RequiredSet::from_ids(&registry, &ids(&["ent", "urologist"])).unwrap();
        let b = RequiredSet::from_ids(&registry, &ids(&["urologist", "ent"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let registry = StepRegistry::builtin().unwrap();
        let mut set = RequiredSet::new();
        assert!(set.insert(&registry, &StepId::new("dentist")).unwrap());
        assert!(!set.insert(&registry, &StepId::new("dentist")).unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.contains(&StepId::new("dentist")));
    }

    #[test]
    fn test_rejects_ids_outside_universe() {
        let registry = StepRegistry::builtin().unwrap();
        let mut set = RequiredSet::new();
        assert!(matches!(
            set.insert(&registry, &StepId::new("gp")),
            Err(WorkflowError::UnknownStep(_))
        ));
        assert!(set.is_empty());
    }
}
