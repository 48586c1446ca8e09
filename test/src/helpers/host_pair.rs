/// A sending host and a receiving host joined by a local transport
/// Messages stay on the wire until the test delivers, drops or reorders them

use replica_shared::{
    ConnectionError, ObjectKey, PacketIdRange, PacketIndex, PacketNotifiable, ReceiveContext,
    ReferenceResolver, ReplicationConfig, ReplicationConnection, ReplicationEvent, ReplicationFlags, SchemaRegistry,
    SendContext, SharedChangeCaches,
};

use crate::{
    helpers::TestResolver,
    local_transport::{LocalTransport, SentMessage},
    test_protocol::protocol,
    test_world::TestWorld,
};

pub struct HostPair {
    pub frame: u64,
    // sending host
    pub server_world: TestWorld,
    pub server_resolver: TestResolver,
    pub caches: SharedChangeCaches,
    pub server: ReplicationConnection<LocalTransport>,
    // receiving host
    pub client_world: TestWorld,
    pub client_resolver: TestResolver,
    pub registry: SchemaRegistry,
    pub client: ReplicationConnection<LocalTransport>,
}

impl Default for HostPair {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPair {
    pub fn new() -> Self {
        Self::with_config(ReplicationConfig::default(), LocalTransport::DEFAULT_BUDGET_BITS)
    }

    pub fn with_config(config: ReplicationConfig, budget_bits: u32) -> Self {
        Self {
            frame: 0,
            server_world: TestWorld::starting_at(1),
            server_resolver: TestResolver::new(),
            caches: SharedChangeCaches::new(),
            server: ReplicationConnection::new(LocalTransport::with_budget(budget_bits), config.clone()),
            client_world: TestWorld::starting_at(1000),
            client_resolver: TestResolver::new(),
            registry: protocol(),
            client: ReplicationConnection::new(LocalTransport::new(), config),
        }
    }

    /// Runs one pass over `object` on the sending host without touching the
    /// wire
    pub fn replicate(
        &mut self,
        object: &ObjectKey,
        flags: ReplicationFlags,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        let mut context = SendContext {
            frame: self.frame,
            world: &self.server_world,
            resolver: &mut self.server_resolver,
            caches: &mut self.caches,
        };
        self.server.replicate(object, flags, &mut context)
    }

    pub fn take_sent(&mut self) -> Vec<SentMessage> {
        self.server.transport_mut().take_sent()
    }

    /// Hands one message to the receiving host, through its wire bytes
    pub fn deliver(&mut self, sent: &SentMessage) -> Result<Vec<ReplicationEvent>, ConnectionError> {
        let mut context = ReceiveContext {
            world: &mut self.client_world,
            resolver: &mut self.client_resolver,
            registry: &self.registry,
        };
        self.client.receive_bytes(sent.channel, &sent.bytes, &mut context)
    }

    pub fn ack(&mut self, packet: PacketIndex) {
        self.server.notify_packet_delivered(packet);
    }

    pub fn drop_packet(&mut self, packet: PacketIndex) {
        self.server.notify_packet_dropped(packet);
    }

    /// Delivers everything on the wire in order and acknowledges it
    pub fn exchange(&mut self) -> Vec<ReplicationEvent> {
        let mut events = Vec::new();
        for sent in self.take_sent() {
            match self.deliver(&sent) {
                Ok(delivered) => events.extend(delivered),
                Err(err) => panic!("delivery of packet {} failed: {}", sent.packet, err),
            }
            self.ack(sent.packet);
        }
        events
    }

    /// Advances the frame, replicates `object` and exchanges the result
    pub fn tick(&mut self, object: &ObjectKey, flags: ReplicationFlags) -> Vec<ReplicationEvent> {
        self.frame += 1;
        if let Err(err) = self.replicate(object, flags) {
            panic!("replication of object {} failed: {}", object.value(), err);
        }
        self.exchange()
    }

    /// The receiving host's copy of a sending host object
    pub fn client_object(&self, server_object: &ObjectKey) -> Option<ObjectKey> {
        let net_id = self.server_resolver.identity_of(server_object)?;
        self.client_resolver.object_for_identity(&net_id)
    }
}
