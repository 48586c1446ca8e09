use crate::{replication::Replica, types::ObjectKey};

/// The host's store of replicated objects. Replication reads live values out
/// of it on send, and spawns, updates and destroys replicas in it on receive.
pub trait ObjectWorld {
    fn replica(&self, object: &ObjectKey) -> Option<&Replica>;

    fn replica_mut(&mut self, object: &ObjectKey) -> Option<&mut Replica>;

    /// Sub-objects replicated as part of `owner`, in a stable order
    fn subobjects(&self, owner: &ObjectKey) -> Vec<ObjectKey>;

    /// Adds a replica received from the remote host. `owner` is set for
    /// sub-objects.
    fn spawn_replica(&mut self, owner: Option<&ObjectKey>, replica: Replica) -> ObjectKey;

    fn destroy_replica(&mut self, object: &ObjectKey);
}
