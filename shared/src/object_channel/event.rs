use crate::{replication::RepNotify, types::ObjectKey};

/// What a received message did to the local world
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicationEvent {
    /// A replica was spawned. `owner` is set for sub-objects.
    Spawned {
        object: ObjectKey,
        owner: Option<ObjectKey>,
        class: String,
    },
    /// A channel reopened for an object kept alive through dormancy
    Reattached { object: ObjectKey },
    Updated {
        object: ObjectKey,
        notifies: Vec<RepNotify>,
    },
    SubObjectDestroyed { object: ObjectKey },
    /// The channel closed dormant; the object stays in the world
    Dormant { object: ObjectKey },
    Destroyed { object: ObjectKey },
}
