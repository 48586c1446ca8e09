use crate::{
    connection::{ObjectWorld, ReferenceResolver},
    replication::{schema::SchemaRegistry, SharedChangeCaches},
};

/// Host state a send pass reads from
pub struct SendContext<'a> {
    /// Simulation frame; passes of different connections in the same frame
    /// share one diff of each object's unconditional properties
    pub frame: u64,
    pub world: &'a dyn ObjectWorld,
    pub resolver: &'a mut dyn ReferenceResolver,
    pub caches: &'a mut SharedChangeCaches,
}

/// Host state a receive writes into
pub struct ReceiveContext<'a> {
    pub world: &'a mut dyn ObjectWorld,
    pub resolver: &'a mut dyn ReferenceResolver,
    pub registry: &'a SchemaRegistry,
}
