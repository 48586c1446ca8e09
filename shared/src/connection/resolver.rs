use crate::types::{NetId, ObjectKey};

/// Maps local objects to connection-agnostic identities. Object reference
/// fields are written as the identity this collaborator hands out, never as
/// a local key.
pub trait ReferenceResolver {
    /// Returns the identity of `object`, assigning one on first use
    fn resolve_or_assign_identity(&mut self, object: &ObjectKey) -> NetId;

    /// True once the remote host is known to have learned `net_id`. A
    /// reference to an identity that is not yet acknowledged is re-sent
    /// until it is.
    fn is_fully_acknowledged(&self, net_id: &NetId) -> bool;

    /// Receive side lookup of an identity the remote assigned
    fn object_for_identity(&self, net_id: &NetId) -> Option<ObjectKey>;

    /// Receive side record of an object spawned for a remote identity
    fn register_remote_identity(&mut self, net_id: NetId, object: ObjectKey);

    /// Receive side release of an identity whose object was destroyed
    fn forget_identity(&mut self, _net_id: &NetId) {}
}
