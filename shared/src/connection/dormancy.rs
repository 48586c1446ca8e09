use std::collections::HashMap;

use log::info;

use crate::{replication::ReplicationAgent, types::ObjectKey};

/// Agents of objects whose channel closed dormant, kept so the object can
/// resume replicating from where it stopped when its channel reopens
#[derive(Default)]
pub struct DormancyTable {
    entries: HashMap<ObjectKey, HashMap<ObjectKey, ReplicationAgent>>,
}

impl DormancyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, object: ObjectKey, agents: HashMap<ObjectKey, ReplicationAgent>) {
        info!(
            "DormancyTable: storing {} agent(s) of object {}",
            agents.len(),
            object.value()
        );
        self.entries.insert(object, agents);
    }

    /// Removes and returns the agents stored for `object`
    pub fn reclaim(&mut self, object: &ObjectKey) -> Option<HashMap<ObjectKey, ReplicationAgent>> {
        let agents = self.entries.remove(object)?;
        info!(
            "DormancyTable: reclaimed {} agent(s) of object {}",
            agents.len(),
            object.value()
        );
        Some(agents)
    }

    pub fn contains(&self, object: &ObjectKey) -> bool {
        self.entries.contains_key(object)
    }

    /// Drops the stored agents of an object that was destroyed while dormant
    pub fn remove(&mut self, object: &ObjectKey) {
        self.entries.remove(object);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
