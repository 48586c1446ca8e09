use std::collections::HashMap;

use log::{debug, info};
use replica_serde::{BitReader, BitWrite, BitWriter, Serde, SerdeErr};

use crate::{
    channel::{Channel, ChannelAck, ChannelState, Message},
    config::ReplicationConfig,
    connection::{
        Connection, ConnectionError, DormancyTable, PacketNotifiable, ReceiveContext,
        SendContext,
    },
    object_channel::{
        content_header::{read_block_payload, write_block_payload, BlockHeader, SpawnHeader},
        event::ReplicationEvent,
        subobject_keys::SubObjectKeys,
    },
    replication::{
        schema::SchemaError, Replica, ReplicationAgent, ReplicationError, ReplicationFlags,
    },
    types::{ChannelIndex, NetId, ObjectKey, PacketIdRange, PacketIndex},
};

/// Replicates one object and its sub-objects over one channel. The sending
/// host drives `replicate`; the receiving host feeds messages to `receive`.
pub struct ObjectChannel {
    channel: Channel,
    config: ReplicationConfig,
    object: Option<ObjectKey>,
    agents: HashMap<ObjectKey, ReplicationAgent>,
    // sending
    open_sent: bool,
    mentioned: HashMap<ObjectKey, NetId>,
    subobject_keys: SubObjectKeys,
    becoming_dormant: bool,
    // receiving
    identities: HashMap<ObjectKey, NetId>,
}

impl ObjectChannel {
    /// Creates the sending side of a channel for `object`. Agents reclaimed
    /// from dormancy resume from their snapshots.
    pub fn new_sender(
        index: ChannelIndex,
        object: ObjectKey,
        config: &ReplicationConfig,
        reclaimed: Option<HashMap<ObjectKey, ReplicationAgent>>,
    ) -> Self {
        let mut channel = Self::new(index, Some(object), config);
        if let Some(mut agents) = reclaimed {
            for agent in agents.values_mut() {
                agent.on_reopen();
            }
            channel.agents = agents;
        }
        channel
    }

    /// Creates the receiving side of a channel the remote host opened
    pub fn new_receiver(index: ChannelIndex, config: &ReplicationConfig) -> Self {
        Self::new(index, None, config)
    }

    fn new(index: ChannelIndex, object: Option<ObjectKey>, config: &ReplicationConfig) -> Self {
        Self {
            channel: Channel::new(index, config),
            config: config.clone(),
            object,
            agents: HashMap::new(),
            open_sent: false,
            mentioned: HashMap::new(),
            subobject_keys: SubObjectKeys::new(config.subobject_nak_buffer),
            becoming_dormant: false,
            identities: HashMap::new(),
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.channel.index()
    }

    /// The replicated object; unset on a receiving channel until its open
    /// arrives
    pub fn object(&self) -> Option<&ObjectKey> {
        self.object.as_ref()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_open_sent(&self) -> bool {
        self.open_sent
    }

    pub fn agent(&self, object: &ObjectKey) -> Option<&ReplicationAgent> {
        self.agents.get(object)
    }

    pub(crate) fn take_agents(&mut self) -> HashMap<ObjectKey, ReplicationAgent> {
        std::mem::take(&mut self.agents)
    }

    /// Asks the channel to close dormant at the first pass after which
    /// nothing is left to send or acknowledge
    pub fn start_becoming_dormant(&mut self) {
        if !self.becoming_dormant {
            debug!("ObjectChannel {} becoming dormant", self.index());
        }
        self.becoming_dormant = true;
    }

    pub fn is_becoming_dormant(&self) -> bool {
        self.becoming_dormant
    }

    /// Cancels a pending dormancy request that has not closed the channel yet
    pub fn wake(&mut self) {
        self.becoming_dormant = false;
    }

    pub fn ready_for_dormancy(&self) -> bool {
        self.channel.is_open_acked()
            && self.channel.state() == ChannelState::Open
            && self.agents.values().all(ReplicationAgent::ready_for_dormancy)
    }

    /// False when a sub-object's replication key has not moved since it was
    /// last sent and no packet carrying it was lost
    pub fn key_needs_to_replicate(&self, net_id: &NetId, key: u32) -> bool {
        self.subobject_keys.needs_to_replicate(net_id, key)
    }

    fn find_or_create_agent(&mut self, object: ObjectKey, replica: &Replica) -> &mut ReplicationAgent {
        let open_acked = self.channel.is_open_acked();
        let config = &self.config;
        self.agents.entry(object).or_insert_with(|| {
            let mut agent = ReplicationAgent::new(object, replica, config);
            if open_acked {
                agent.on_open_acked();
            }
            agent
        })
    }

    // Sending

    /// Runs one pass over the object and its sub-objects and sends the
    /// result. Returns the packets the message went out on, or `None` when
    /// there was nothing to send. When the pass fails after some agents
    /// wrote, their changes are kept as resend debt for the next pass.
    pub fn replicate(
        &mut self,
        connection: &mut dyn Connection,
        flags: ReplicationFlags,
        context: &mut SendContext,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        let mut written_agents: Vec<ObjectKey> = Vec::new();
        let result = self.write_pass(connection, flags, context, &mut written_agents);
        if result.is_err() {
            for written in &written_agents {
                if let Some(agent) = self.agents.get_mut(written) {
                    agent.abandon_pass();
                }
            }
        }
        result
    }

    fn write_pass(
        &mut self,
        connection: &mut dyn Connection,
        flags: ReplicationFlags,
        context: &mut SendContext,
        written_agents: &mut Vec<ObjectKey>,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        let Some(object) = self.object else {
            return Ok(None);
        };
        let world = context.world;
        let replica = world.replica(&object).ok_or(ConnectionError::ObjectNotFound {
            object: object.value(),
        })?;

        let mut writer = BitWriter::new();
        let opening = !self.open_sent;
        let mut important = opening;
        let mut reliable = opening;
        let mut first_mentions: Vec<(ObjectKey, NetId)> = Vec::new();
        let mut written_keys: Vec<(NetId, u32)> = Vec::new();

        let owner_id = context.resolver.resolve_or_assign_identity(&object);
        if opening {
            SpawnHeader {
                net_id: owner_id,
                class: replica.class_name().to_string(),
            }
            .ser(&mut writer);
        }

        // the object itself
        let cache = context.caches.get_or_create(&object);
        let mut block = BitWriter::new();
        let agent = self.find_or_create_agent(object, replica);
        if agent.replicate(replica, &cache, context.frame, flags, &mut block, &mut *context.resolver)? {
            writer.write_bit(true);
            BlockHeader::Root.ser(&mut writer);
            let (bytes, bits) = block.into_bits();
            write_block_payload(&mut writer, &bytes, bits);
            written_agents.push(object);
            important = true;
        }

        // sub-objects
        let subobjects = world.subobjects(&object);
        for sub in &subobjects {
            let Some(sub_replica) = world.replica(sub) else {
                continue;
            };
            let net_id = context.resolver.resolve_or_assign_identity(sub);
            let key = sub_replica.replication_key();
            let first_mention = !self.mentioned.contains_key(sub);
            let has_debt = self
                .agents
                .get(sub)
                .is_some_and(ReplicationAgent::has_pending_resend);
            if !first_mention && !has_debt && !self.key_needs_to_replicate(&net_id, key) {
                if let Some(agent) = self.agents.get_mut(sub) {
                    agent.mark_unchanged();
                }
                continue;
            }

            let cache = context.caches.get_or_create(sub);
            let mut block = BitWriter::new();
            let agent = self.find_or_create_agent(*sub, sub_replica);
            let wrote = agent.replicate(
                sub_replica,
                &cache,
                context.frame,
                flags,
                &mut block,
                &mut *context.resolver,
            )?;
            if !wrote && !first_mention {
                self.subobject_keys.note_unchanged(net_id, key);
                continue;
            }

            writer.write_bit(true);
            BlockHeader::SubObject {
                net_id,
                outer: owner_id,
                class: first_mention.then(|| sub_replica.class_name().to_string()),
            }
            .ser(&mut writer);
            let (bytes, bits) = block.into_bits();
            write_block_payload(&mut writer, &bytes, bits);

            if first_mention {
                first_mentions.push((*sub, net_id));
            }
            written_keys.push((net_id, key));
            if wrote {
                written_agents.push(*sub);
            }
            // the remote must learn the class before any later update
            reliable |= first_mention;
            important = true;
        }

        // destroyed sub-objects
        let mut destroyed: Vec<(ObjectKey, NetId)> = self
            .mentioned
            .iter()
            .filter(|(sub, _)| !subobjects.contains(sub) || world.replica(sub).is_none())
            .map(|(sub, net_id)| (*sub, *net_id))
            .collect();
        destroyed.sort_by_key(|(_, net_id)| net_id.value());
        for (_, net_id) in &destroyed {
            writer.write_bit(true);
            BlockHeader::Deleted { net_id: *net_id }.ser(&mut writer);
            reliable = true;
            important = true;
        }
        writer.write_bit(false);

        if !important {
            if self.becoming_dormant && self.ready_for_dormancy() {
                return self.send_close(connection, true).map(Some);
            }
            return Ok(None);
        }

        let mut message = Message::from_writer(writer).with_reliable(reliable);
        if opening {
            message = message.with_open();
        }
        let range = self.channel.send(connection, message)?;
        if opening {
            info!(
                "ObjectChannel {} opened for object {}",
                self.index(),
                object.value()
            );
            self.open_sent = true;
        }
        for written in written_agents.drain(..) {
            if let Some(agent) = self.agents.get_mut(&written) {
                agent.post_send(range, reliable);
            }
        }
        self.mentioned.extend(first_mentions);
        for (sub, net_id) in destroyed {
            self.mentioned.remove(&sub);
            self.agents.remove(&sub);
            self.subobject_keys.forget(&net_id);
        }
        self.subobject_keys.record(range, &written_keys);

        Ok(Some(range))
    }

    /// Closes the channel. A dormant close keeps the remote object alive.
    pub fn send_close(
        &mut self,
        connection: &mut dyn Connection,
        dormant: bool,
    ) -> Result<PacketIdRange, ConnectionError> {
        let mut writer = BitWriter::new();
        writer.write_bit(false);
        let message = Message::from_writer(writer).with_close(dormant);
        let range = self.channel.send(connection, message)?;
        info!(
            "ObjectChannel {} sent close (dormant: {})",
            self.index(),
            dormant
        );
        Ok(range)
    }

    /// Records acknowledgment of a packet with the channel and every agent
    pub fn notify_packet_delivered(&mut self, packet_index: PacketIndex) -> ChannelAck {
        let ack = self.channel.notify_packet_delivered(packet_index);
        for agent in self.agents.values_mut() {
            agent.notify_packet_delivered(packet_index);
            if ack.open_acked {
                agent.on_open_acked();
            }
        }
        ack
    }

    /// Resends reliable messages carried by a lost packet and marks the
    /// properties it carried for resend
    pub fn notify_packet_dropped(&mut self, connection: &mut dyn Connection, packet_index: PacketIndex) {
        self.channel.notify_packet_dropped(connection, packet_index);
        for agent in self.agents.values_mut() {
            agent.notify_packet_dropped(packet_index);
        }
        self.subobject_keys.notify_packet_dropped(packet_index);
    }

    // Receiving

    /// Accepts one message off the wire, applying every message it completes
    pub fn receive(
        &mut self,
        message: Message,
        context: &mut ReceiveContext,
        dormancy: &mut DormancyTable,
    ) -> Result<Vec<ReplicationEvent>, ConnectionError> {
        let mut events = Vec::new();
        for message in self.channel.receive(message)? {
            self.apply(message, context, dormancy, &mut events)?;
        }
        if self.object.is_some() && !self.agents.is_empty() {
            events.extend(self.update_unmapped_references(context));
        }
        Ok(events)
    }

    fn malformed(&self, source: SerdeErr) -> ConnectionError {
        ConnectionError::MalformedMessage {
            channel: self.index(),
            source,
        }
    }

    fn apply(
        &mut self,
        message: Message,
        context: &mut ReceiveContext,
        dormancy: &mut DormancyTable,
        events: &mut Vec<ReplicationEvent>,
    ) -> Result<(), ConnectionError> {
        let mut reader = message.payload_reader();

        if message.open {
            let header = SpawnHeader::de(&mut reader).map_err(|err| self.malformed(err))?;
            if self.object.is_none() {
                let object = self.spawn_or_reattach(header, context, dormancy, events)?;
                self.object = Some(object);
            }
        }

        loop {
            if !reader.read_bit().map_err(|err| self.malformed(err))? {
                break;
            }
            let header = BlockHeader::de(&mut reader).map_err(|err| self.malformed(err))?;
            let payload = if header.has_payload() {
                Some(read_block_payload(&mut reader).map_err(|err| self.malformed(err))?)
            } else {
                None
            };

            match (header, payload) {
                (BlockHeader::Root, Some((bytes, bits))) => {
                    let object = self.object.ok_or(ReplicationError::UnknownSubObject {
                        net_id: NetId::INVALID.value(),
                    })?;
                    self.receive_block(object, &bytes, bits, context, events)?;
                }
                (BlockHeader::SubObject { net_id, class, .. }, Some((bytes, bits))) => {
                    let sub = self.find_or_spawn_subobject(net_id, class, context, events)?;
                    self.receive_block(sub, &bytes, bits, context, events)?;
                }
                (BlockHeader::Deleted { net_id }, _) => {
                    if let Some(sub) = context.resolver.object_for_identity(&net_id) {
                        self.agents.remove(&sub);
                        self.identities.remove(&sub);
                        context.world.destroy_replica(&sub);
                        context.resolver.forget_identity(&net_id);
                        events.push(ReplicationEvent::SubObjectDestroyed { object: sub });
                    }
                }
                _ => {}
            }
        }

        if message.close {
            self.apply_close(message.dormant, context, dormancy, events);
        }
        Ok(())
    }

    fn spawn_or_reattach(
        &mut self,
        header: SpawnHeader,
        context: &mut ReceiveContext,
        dormancy: &mut DormancyTable,
        events: &mut Vec<ReplicationEvent>,
    ) -> Result<ObjectKey, ConnectionError> {
        if let Some(object) = context.resolver.object_for_identity(&header.net_id) {
            if context.world.replica(&object).is_some() {
                if let Some(agents) = dormancy.reclaim(&object) {
                    self.agents = agents;
                }
                self.identities.insert(object, header.net_id);
                events.push(ReplicationEvent::Reattached { object });
                return Ok(object);
            }
        }

        let replica = self.instantiate(&header.class, context)?;
        let object = context.world.spawn_replica(None, replica);
        context.resolver.register_remote_identity(header.net_id, object);
        self.identities.insert(object, header.net_id);
        info!(
            "ObjectChannel {} spawned {} as object {}",
            self.index(),
            header.class,
            object.value()
        );
        events.push(ReplicationEvent::Spawned {
            object,
            owner: None,
            class: header.class,
        });
        Ok(object)
    }

    fn find_or_spawn_subobject(
        &mut self,
        net_id: NetId,
        class: Option<String>,
        context: &mut ReceiveContext,
        events: &mut Vec<ReplicationEvent>,
    ) -> Result<ObjectKey, ConnectionError> {
        if let Some(sub) = context.resolver.object_for_identity(&net_id) {
            if context.world.replica(&sub).is_some() {
                self.identities.insert(sub, net_id);
                return Ok(sub);
            }
        }
        let Some(class) = class else {
            return Err(ReplicationError::UnknownSubObject {
                net_id: net_id.value(),
            }
            .into());
        };

        let replica = self.instantiate(&class, context)?;
        let sub = context.world.spawn_replica(self.object.as_ref(), replica);
        context.resolver.register_remote_identity(net_id, sub);
        self.identities.insert(sub, net_id);
        events.push(ReplicationEvent::Spawned {
            object: sub,
            owner: self.object,
            class,
        });
        Ok(sub)
    }

    fn instantiate(&self, class: &str, context: &ReceiveContext) -> Result<Replica, ConnectionError> {
        let schema = context.registry.class_schema(class).map_err(|err| match err {
            SchemaError::NotRegistered { .. } => ReplicationError::UnknownClass {
                class: class.to_string(),
            },
            other => ReplicationError::Schema(other),
        })?;
        Ok(Replica::new(schema))
    }

    fn receive_block(
        &mut self,
        object: ObjectKey,
        bytes: &[u8],
        bits: u32,
        context: &mut ReceiveContext,
        events: &mut Vec<ReplicationEvent>,
    ) -> Result<(), ConnectionError> {
        let replica = context
            .world
            .replica_mut(&object)
            .ok_or(ConnectionError::ObjectNotFound {
                object: object.value(),
            })?;
        let config = &self.config;
        let agent = self
            .agents
            .entry(object)
            .or_insert_with(|| ReplicationAgent::new(object, replica, config));
        let mut reader = BitReader::with_bit_len(bytes, bits);
        let notifies = agent.receive(replica, &mut reader, &*context.resolver)?;
        events.push(ReplicationEvent::Updated { object, notifies });
        Ok(())
    }

    fn apply_close(
        &mut self,
        dormant: bool,
        context: &mut ReceiveContext,
        dormancy: &mut DormancyTable,
        events: &mut Vec<ReplicationEvent>,
    ) {
        let Some(object) = self.object else {
            return;
        };
        if dormant {
            dormancy.store(object, std::mem::take(&mut self.agents));
            events.push(ReplicationEvent::Dormant { object });
            return;
        }

        let mut doomed: Vec<ObjectKey> = context.world.subobjects(&object);
        for sub in self.identities.keys() {
            if *sub != object && !doomed.contains(sub) {
                doomed.push(*sub);
            }
        }
        for sub in doomed {
            if let Some(net_id) = self.identities.remove(&sub) {
                context.resolver.forget_identity(&net_id);
            }
            context.world.destroy_replica(&sub);
            events.push(ReplicationEvent::SubObjectDestroyed { object: sub });
        }
        if let Some(net_id) = self.identities.remove(&object) {
            context.resolver.forget_identity(&net_id);
        }
        context.world.destroy_replica(&object);
        dormancy.remove(&object);
        self.agents.clear();
        events.push(ReplicationEvent::Destroyed { object });
    }

    /// Retries object references received before their identity was known
    pub fn update_unmapped_references(&mut self, context: &mut ReceiveContext) -> Vec<ReplicationEvent> {
        let mut events = Vec::new();
        for (object, agent) in self.agents.iter_mut() {
            if !agent.has_unresolved_references() {
                continue;
            }
            let Some(replica) = context.world.replica_mut(object) else {
                continue;
            };
            let notifies = agent.update_unmapped_references(replica, &*context.resolver);
            if !notifies.is_empty() {
                events.push(ReplicationEvent::Updated {
                    object: *object,
                    notifies,
                });
            }
        }
        events
    }
}
