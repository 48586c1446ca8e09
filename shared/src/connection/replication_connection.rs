use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::{
    channel::{ChannelState, Message},
    config::ReplicationConfig,
    connection::{
        Connection, ConnectionError, DormancyTable, PacketNotifiable, ReceiveContext,
        SendContext,
    },
    object_channel::{ObjectChannel, ReplicationEvent},
    replication::ReplicationFlags,
    types::{ChannelIndex, ObjectKey, PacketIdRange, PacketIndex},
};

/// Replication state of one remote peer: a channel per replicated object over
/// a single transport, plus the agents of objects that went dormant
pub struct ReplicationConnection<C: Connection> {
    transport: C,
    config: ReplicationConfig,
    channels: HashMap<ChannelIndex, ObjectChannel>,
    object_channels: HashMap<ObjectKey, ChannelIndex>,
    next_channel: ChannelIndex,
    /// Receiving channels the remote closed. Only a new open revives them.
    released: HashSet<ChannelIndex>,
    dormancy: DormancyTable,
    closed: bool,
}

impl<C: Connection> ReplicationConnection<C> {
    pub fn new(transport: C, config: ReplicationConfig) -> Self {
        Self {
            transport,
            config,
            channels: HashMap::new(),
            object_channels: HashMap::new(),
            next_channel: 0,
            released: HashSet::new(),
            dormancy: DormancyTable::new(),
            closed: false,
        }
    }

    pub fn transport(&self) -> &C {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut C {
        &mut self.transport
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// True once a fatal error closed the connection
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn dormancy(&self) -> &DormancyTable {
        &self.dormancy
    }

    /// Sending side channel of `object`
    pub fn object_channel(&self, object: &ObjectKey) -> Option<&ObjectChannel> {
        let index = self.object_channels.get(object)?;
        self.channels.get(index)
    }

    pub fn channel(&self, index: ChannelIndex) -> Option<&ObjectChannel> {
        self.channels.get(&index)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    /// Closes the connection on fatal errors, then hands the error back
    fn check<T>(&mut self, result: Result<T, ConnectionError>) -> Result<T, ConnectionError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!("ReplicationConnection: closing after fatal error: {}", err);
                self.closed = true;
                self.channels.clear();
                self.object_channels.clear();
            }
        }
        result
    }

    fn allocate_channel(&mut self) -> ChannelIndex {
        loop {
            let index = self.next_channel;
            self.next_channel = self.next_channel.wrapping_add(1);
            if !self.channels.contains_key(&index) {
                return index;
            }
        }
    }

    fn find_or_create_channel(&mut self, object: &ObjectKey) -> ChannelIndex {
        if let Some(index) = self.object_channels.get(object) {
            return *index;
        }
        let index = self.allocate_channel();
        let reclaimed = self.dormancy.reclaim(object);
        let channel = ObjectChannel::new_sender(index, *object, &self.config, reclaimed);
        info!(
            "ReplicationConnection: channel {} assigned to object {}",
            index,
            object.value()
        );
        self.channels.insert(index, channel);
        self.object_channels.insert(*object, index);
        index
    }

    // Sending

    /// Replicates `object` to the remote host, opening its channel on first
    /// use. Returns the packets the update went out on, if anything was sent.
    pub fn replicate(
        &mut self,
        object: &ObjectKey,
        flags: ReplicationFlags,
        context: &mut SendContext,
    ) -> Result<Option<PacketIdRange>, ConnectionError> {
        self.ensure_open()?;
        let index = self.find_or_create_channel(object);
        let result = match self.channels.get_mut(&index) {
            Some(channel) => {
                if channel.channel().is_closing() {
                    Ok(None)
                } else {
                    channel.replicate(&mut self.transport, flags, context)
                }
            }
            None => Ok(None),
        };
        self.check(result)
    }

    /// Requests a dormant close of the object's channel once everything it
    /// sent is acknowledged
    pub fn start_becoming_dormant(&mut self, object: &ObjectKey) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        let index = self
            .object_channels
            .get(object)
            .ok_or(ConnectionError::ChannelNotFound {
                object: object.value(),
            })?;
        if let Some(channel) = self.channels.get_mut(index) {
            channel.start_becoming_dormant();
        }
        Ok(())
    }

    pub fn is_dormant(&self, object: &ObjectKey) -> bool {
        self.dormancy.contains(object)
    }

    /// Closes the object's channel, destroying the object on the remote host
    pub fn close_object(&mut self, object: &ObjectKey) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.dormancy.remove(object);
        let Some(index) = self.object_channels.get(object).copied() else {
            return Ok(());
        };
        let Some(channel) = self.channels.get_mut(&index) else {
            return Ok(());
        };
        if !channel.is_open_sent() {
            self.channels.remove(&index);
            self.object_channels.remove(object);
            return Ok(());
        }
        if channel.channel().is_closing() {
            return Ok(());
        }
        let result = channel.send_close(&mut self.transport, false).map(|_| ());
        self.check(result)
    }

    // Receiving

    /// Accepts one message the remote host sent on `index`
    pub fn receive(
        &mut self,
        index: ChannelIndex,
        message: Message,
        context: &mut ReceiveContext,
    ) -> Result<Vec<ReplicationEvent>, ConnectionError> {
        self.ensure_open()?;
        if self.released.contains(&index) {
            if !message.open {
                debug!("Connection dropping message {} on released channel {}", message.sequence, index);
                return Ok(Vec::new());
            }
            self.released.remove(&index);
        }
        let config = &self.config;
        let channel = self
            .channels
            .entry(index)
            .or_insert_with(|| ObjectChannel::new_receiver(index, config));
        let result = channel.receive(message, context, &mut self.dormancy);
        let finished = channel.channel().state() == ChannelState::Closed
            && channel.object().is_some();
        if finished {
            self.channels.remove(&index);
            self.released.insert(index);
        }
        self.check(result)
    }

    /// Decodes a message written with `Message::write` and accepts it
    pub fn receive_bytes(
        &mut self,
        index: ChannelIndex,
        bytes: &[u8],
        context: &mut ReceiveContext,
    ) -> Result<Vec<ReplicationEvent>, ConnectionError> {
        self.ensure_open()?;
        let message = Message::from_bytes(bytes).map_err(|source| ConnectionError::MalformedMessage {
            channel: index,
            source,
        });
        let message = self.check(message)?;
        self.receive(index, message, context)
    }

    /// Retries received object references whose identity was unknown
    pub fn update_unmapped_references(&mut self, context: &mut ReceiveContext) -> Vec<ReplicationEvent> {
        let mut events = Vec::new();
        for channel in self.channels.values_mut() {
            events.extend(channel.update_unmapped_references(context));
        }
        events
    }
}

impl<C: Connection> PacketNotifiable for ReplicationConnection<C> {
    fn notify_packet_delivered(&mut self, packet_index: PacketIndex) {
        if self.closed {
            return;
        }
        let mut released = Vec::new();
        for (index, channel) in self.channels.iter_mut() {
            let ack = channel.notify_packet_delivered(packet_index);
            if ack.closed {
                released.push(*index);
            }
        }

        for index in released {
            let Some(mut channel) = self.channels.remove(&index) else {
                continue;
            };
            let Some(object) = channel.object().copied() else {
                continue;
            };
            self.object_channels.remove(&object);
            if channel.channel().is_dormant() {
                self.dormancy.store(object, channel.take_agents());
                info!(
                    "ReplicationConnection: object {} is dormant",
                    object.value()
                );
            } else {
                info!(
                    "ReplicationConnection: channel {} of object {} released",
                    index,
                    object.value()
                );
            }
        }
    }

    fn notify_packet_dropped(&mut self, packet_index: PacketIndex) {
        if self.closed {
            return;
        }
        for channel in self.channels.values_mut() {
            channel.notify_packet_dropped(&mut self.transport, packet_index);
        }
    }
}
