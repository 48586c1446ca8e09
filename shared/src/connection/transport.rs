use crate::{
    channel::Message,
    types::{ChannelIndex, PacketIndex},
};

/// Packet-level transport a replication connection writes through. Packet
/// indices are expected to be handed out sequentially; acknowledgment of a
/// packet is reported back through `PacketNotifiable`.
pub trait Connection {
    /// Queues a message for the wire and returns the packet it went out on
    fn send_message(&mut self, channel: ChannelIndex, message: &Message) -> PacketIndex;

    /// Largest message, header included, that fits in a single packet
    fn max_message_size_bits(&self) -> u32;
}

/// Anything that needs to hear about the fate of a sent packet
pub trait PacketNotifiable {
    /// Called when a packet has been confirmed received by the remote host
    fn notify_packet_delivered(&mut self, packet_index: PacketIndex);

    /// Called when a packet is known lost
    fn notify_packet_dropped(&mut self, packet_index: PacketIndex);
}
