use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The set of machines an operation may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineRegistry {
    machines: BTreeSet<String>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for id in ids {
            registry.register(id);
        }
        registry
    }

    /// Returns `false` if the id was blank or already known.
    pub fn register(&mut self, machine_id: impl Into<String>) -> bool {
        let id: String = machine_id.into();
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.machines.insert(id.to_string())
    }

    pub fn remove(&mut self, machine_id: &str) -> bool {
        self.machines.remove(machine_id)
    }

    pub fn contains(&self, machine_id: &str) -> bool {
        self.machines.contains(machine_id)
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.machines.iter().map(String::as_str)
    }
}
