use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockWriteGuard, TryLockError},
};

use log::info;

use crate::{
    replication::{change_list::ChangeList, error::ReplicationError},
    types::ObjectKey,
};

/// One frame's diff of an object's unconditional properties, shared by
/// every connection replicating the object in that frame
#[derive(Debug, Default)]
pub struct SharedChangeCache {
    last_replication_frame: u64,
    /// Frame of the last pass of the snapshot the cached diff was taken
    /// against; any snapshot last replicated in that frame shares its shadow
    last_group_frame: u64,
    per_parent: Vec<(usize, ChangeList)>,
    custom_active: HashMap<usize, bool>,
    active_generation: u32,
}

impl SharedChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_reuse(&self, frame: u64, snapshot_frame: u64, skip_enabled: bool) -> bool {
        skip_enabled
            && snapshot_frame != 0
            && self.last_replication_frame == frame
            && self.last_group_frame == snapshot_frame
    }

    pub fn cached(&self) -> &[(usize, ChangeList)] {
        &self.per_parent
    }

    pub fn store(&mut self, frame: u64, snapshot_frame: u64, per_parent: Vec<(usize, ChangeList)>) {
        self.last_replication_frame = frame;
        self.last_group_frame = snapshot_frame;
        self.per_parent = per_parent;
    }

    pub fn invalidate(&mut self) {
        self.last_replication_frame = 0;
        self.last_group_frame = 0;
        self.per_parent.clear();
    }

    /// Toggles a property replicated under `RepCondition::Custom`. Every
    /// snapshot of the object rebuilds its conditional subset afterwards.
    pub fn set_custom_active(&mut self, parent_index: usize, active: bool) {
        let previous = self.custom_active.insert(parent_index, active);
        if previous.unwrap_or(true) != active {
            self.active_generation = self.active_generation.wrapping_add(1);
            self.invalidate();
        }
    }

    pub fn is_custom_active(&self, parent_index: usize) -> bool {
        self.custom_active.get(&parent_index).copied().unwrap_or(true)
    }

    pub fn active_generation(&self) -> u32 {
        self.active_generation
    }
}

/// Caches of every replicated object, keyed by object
#[derive(Default)]
pub struct SharedChangeCaches {
    caches: HashMap<ObjectKey, Arc<RwLock<SharedChangeCache>>>,
}

impl SharedChangeCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, object: &ObjectKey) -> Arc<RwLock<SharedChangeCache>> {
        self.caches
            .entry(*object)
            .or_insert_with(|| {
                info!("SharedChangeCaches: creating cache for object {}", object.value());
                Arc::new(RwLock::new(SharedChangeCache::new()))
            })
            .clone()
    }

    pub fn get(&self, object: &ObjectKey) -> Option<Arc<RwLock<SharedChangeCache>>> {
        self.caches.get(object).cloned()
    }

    pub fn remove(&mut self, object: &ObjectKey) {
        self.caches.remove(object);
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// Locks a cache for one replication pass. A cache already locked means the
/// object is being replicated from inside its own pass.
pub(crate) fn try_lock_for_pass<'c>(
    cache: &'c RwLock<SharedChangeCache>,
    object: &ObjectKey,
) -> Result<RwLockWriteGuard<'c, SharedChangeCache>, ReplicationError> {
    match cache.try_write() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(ReplicationError::ReentrantReplication {
            object: object.value(),
        }),
        Err(TryLockError::Poisoned(_)) => Err(ReplicationError::CachePoisoned {
            object: object.value(),
        }),
    }
}
