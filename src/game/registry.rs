//! Bound machines by name

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::TurnScheduler;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Machine already bound: {0}")]
    Duplicate(String),

    #[error("Machine limit reached ({0})")]
    Full(usize),
}

pub struct MachineRegistry {
    machines: DashMap<String, Arc<TurnScheduler>>,
    max_machines: usize,
}

impl MachineRegistry {
    pub fn new(max_machines: usize) -> Self {
        Self {
            machines: DashMap::new(),
            max_machines,
        }
    }

    pub fn insert(&self, scheduler: Arc<TurnScheduler>) -> Result<(), RegistryError> {
        if self.machines.len() >= self.max_machines {
            return Err(RegistryError::Full(self.max_machines));
        }
        match self.machines.entry(scheduler.name().to_string()) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(scheduler);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<TurnScheduler>> {
        self.machines.get(name).map(|m| m.value().clone())
    }

    /// Unbind a machine and stop its tasks
    pub fn remove(&self, name: &str) -> Option<Arc<TurnScheduler>> {
        let (_, scheduler) = self.machines.remove(name)?;
        scheduler.shutdown();
        Some(scheduler)
    }

    /// All bound schedulers, sorted by name
    pub fn list(&self) -> Vec<Arc<TurnScheduler>> {
        let mut all: Vec<_> = self.machines.iter().map(|m| m.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn shutdown_all(&self) {
        for entry in self.machines.iter() {
            entry.value().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerSettings;
    use crate::game::GameMode;
    use crate::hardware::SimulatedMachine;
    use crate::modes::policy_for;
    use crate::notify::WebhookNotifier;

    fn bind(name: &str) -> Arc<TurnScheduler> {
        TurnScheduler::bind(
            Arc::new(SimulatedMachine::manual(name)),
            policy_for(GameMode::Single),
            SchedulerSettings::default(),
            Arc::new(WebhookNotifier::new(None)),
        )
    }

    #[tokio::test]
    async fn enforces_limit_and_unique_names() {
        let registry = MachineRegistry::new(2);
        registry.insert(bind("claw1")).unwrap();
        assert_eq!(
            registry.insert(bind("claw1")),
            Err(RegistryError::Duplicate("claw1".to_string()))
        );
        registry.insert(bind("claw2")).unwrap();
        assert_eq!(registry.insert(bind("claw3")), Err(RegistryError::Full(2)));

        let names: Vec<_> = registry.list().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["claw1", "claw2"]);
    }

    #[tokio::test]
    async fn remove_unbinds() {
        let registry = MachineRegistry::new(4);
        registry.insert(bind("claw1")).unwrap();
        assert!(registry.remove("claw1").is_some());
        assert!(registry.get("claw1").is_none());
        assert!(registry.is_empty());
    }
}
