/// Simple world implementation for replication tests
/// Keeps replicas in a HashMap and sub-objects in insertion order

use std::collections::HashMap;

use replica_shared::{ObjectKey, ObjectWorld, Replica};

pub struct TestWorld {
    replicas: HashMap<ObjectKey, Replica>,
    subobjects: HashMap<ObjectKey, Vec<ObjectKey>>,
    next_key: u64,
    destroyed: Vec<ObjectKey>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys handed out start at `first`, so two worlds in one test never
    /// share a key by accident
    pub fn starting_at(first: u64) -> Self {
        Self {
            replicas: HashMap::new(),
            subobjects: HashMap::new(),
            next_key: first,
            destroyed: Vec::new(),
        }
    }

    fn next_key(&mut self) -> ObjectKey {
        let key = ObjectKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    pub fn spawn(&mut self, replica: Replica) -> ObjectKey {
        let key = self.next_key();
        self.replicas.insert(key, replica);
        key
    }

    pub fn spawn_subobject(&mut self, owner: &ObjectKey, replica: Replica) -> ObjectKey {
        let key = self.spawn(replica);
        self.subobjects.entry(*owner).or_default().push(key);
        key
    }

    pub fn get(&self, object: &ObjectKey) -> &Replica {
        self.replicas
            .get(object)
            .unwrap_or_else(|| panic!("object {} not in world", object.value()))
    }

    pub fn get_mut(&mut self, object: &ObjectKey) -> &mut Replica {
        self.replicas
            .get_mut(object)
            .unwrap_or_else(|| panic!("object {} not in world", object.value()))
    }

    pub fn contains(&self, object: &ObjectKey) -> bool {
        self.replicas.contains_key(object)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Every object destroyed so far, in order
    pub fn destroyed(&self) -> &[ObjectKey] {
        &self.destroyed
    }
}

impl ObjectWorld for TestWorld {
    fn replica(&self, object: &ObjectKey) -> Option<&Replica> {
        self.replicas.get(object)
    }

    fn replica_mut(&mut self, object: &ObjectKey) -> Option<&mut Replica> {
        self.replicas.get_mut(object)
    }

    fn subobjects(&self, owner: &ObjectKey) -> Vec<ObjectKey> {
        self.subobjects.get(owner).cloned().unwrap_or_default()
    }

    fn spawn_replica(&mut self, owner: Option<&ObjectKey>, replica: Replica) -> ObjectKey {
        match owner {
            Some(owner) => self.spawn_subobject(owner, replica),
            None => self.spawn(replica),
        }
    }

    fn destroy_replica(&mut self, object: &ObjectKey) {
        if self.replicas.remove(object).is_some() {
            self.destroyed.push(*object);
        }
        self.subobjects.remove(object);
        for children in self.subobjects.values_mut() {
            children.retain(|child| child != object);
        }
    }
}
