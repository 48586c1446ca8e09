use log::{debug, info};

use crate::{
    channel::{
        error::ChannelError,
        message::{Message, MESSAGE_HEADER_MAX_BITS},
        outgoing::OutgoingReliable,
        partial::{split_message, PartialAccumulator},
        reliable_receiver::ReliableReceiver,
    },
    config::ReplicationConfig,
    connection::Connection,
    types::{ChannelIndex, MessageIndex, PacketIdRange, PacketIndex},
};

cfg_if! {
    if #[cfg(feature = "trace_wire")] {
        fn trace_message(direction: &str, channel: ChannelIndex, message: &Message) {
            debug!(
                "Channel {} {} message: seq {} reliable {} open {} close {} dormant {} partial {:?} bits {}",
                channel,
                direction,
                message.sequence,
                message.reliable,
                message.open,
                message.close,
                message.dormant,
                message.partial,
                message.payload_bits()
            );
        }
    } else {
        fn trace_message(_direction: &str, _channel: ChannelIndex, _message: &Message) {}
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Closed,
    /// Open sent, not yet acknowledged
    OpenPending,
    Open,
    /// Close sent, waiting for every reliable message to be acknowledged
    Closing,
}

/// What an acknowledgment changed on a channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelAck {
    /// The open handshake has just been fully acknowledged
    pub open_acked: bool,
    /// The close has been acknowledged and the channel can be released
    pub closed: bool,
}

/// Reliable/unreliable framing for one channel slot of a connection
pub struct Channel {
    index: ChannelIndex,
    state: ChannelState,
    max_reliable_backlog: usize,
    last_reliable_sent: MessageIndex,
    last_unreliable_partial: MessageIndex,
    outgoing: OutgoingReliable,
    receiver: ReliableReceiver,
    partials: PartialAccumulator,
    open_sequences: Vec<MessageIndex>,
    open_acked: bool,
    dormant: bool,
    finished: bool,
}

impl Channel {
    pub fn new(index: ChannelIndex, config: &ReplicationConfig) -> Self {
        Self {
            index,
            state: ChannelState::Closed,
            max_reliable_backlog: config.max_reliable_backlog,
            last_reliable_sent: 0,
            last_unreliable_partial: 0,
            outgoing: OutgoingReliable::new(),
            receiver: ReliableReceiver::new(index, config.max_reliable_backlog),
            partials: PartialAccumulator::new(index, config.max_partial_bytes),
            open_sequences: Vec::new(),
            open_acked: false,
            dormant: false,
            finished: false,
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open_acked(&self) -> bool {
        self.open_acked
    }

    pub fn is_closing(&self) -> bool {
        self.state == ChannelState::Closing
    }

    /// Whether the close sent or received on this channel was a dormant close
    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub fn outstanding_reliable(&self) -> usize {
        self.outgoing.len()
    }

    /// True while a partial sequence is being rebuilt on receive
    pub fn has_pending_partial(&self) -> bool {
        self.partials.is_pending()
    }

    pub fn buffered_reliable(&self) -> usize {
        self.receiver.buffered()
    }

    /// Sends a message, splitting it into partials when it does not fit in
    /// one packet. Open and close messages are always reliable. Returns the
    /// range of packets the message went out on.
    pub fn send(
        &mut self,
        connection: &mut dyn Connection,
        mut message: Message,
    ) -> Result<PacketIdRange, ChannelError> {
        if self.finished || self.state == ChannelState::Closing {
            return Err(ChannelError::ChannelClosed {
                channel: self.index,
            });
        }
        if message.open || message.close {
            message.reliable = true;
        }

        let budget_bits = connection
            .max_message_size_bits()
            .saturating_sub(MESSAGE_HEADER_MAX_BITS)
            / 8
            * 8;
        if budget_bits == 0 {
            return Err(ChannelError::BudgetTooSmall {
                budget_bits: connection.max_message_size_bits(),
            });
        }

        let opening = message.open;
        let parts = if message.payload_bits() > budget_bits {
            split_message(&message, budget_bits)
        } else {
            vec![message]
        };

        let reliable = parts.first().is_some_and(|part| part.reliable);
        let closing = parts.last().is_some_and(|part| part.close);
        if reliable {
            let limit = self.max_reliable_backlog + usize::from(closing);
            if self.outgoing.len() + parts.len() >= limit {
                return Err(ChannelError::ReliableBacklogOverflow {
                    channel: self.index,
                    outstanding: self.outgoing.len(),
                    incoming: parts.len(),
                    limit,
                });
            }
        }

        let mut range: Option<PacketIdRange> = None;
        for mut part in parts {
            if part.reliable {
                self.last_reliable_sent = self.last_reliable_sent.wrapping_add(1);
                part.sequence = self.last_reliable_sent;
            } else if part.is_partial() {
                self.last_unreliable_partial = self.last_unreliable_partial.wrapping_add(1);
                part.sequence = self.last_unreliable_partial;
            }

            if opening && part.reliable {
                self.open_sequences.push(part.sequence);
            }
            if part.close {
                self.dormant = part.dormant;
            }

            trace_message("sending", self.index, &part);
            let packet_index = connection.send_message(self.index, &part);
            match range.as_mut() {
                Some(range) => range.extend_to(packet_index),
                None => range = Some(PacketIdRange::single(packet_index)),
            }

            let opens = part.open;
            let closes = part.close;
            if part.reliable {
                self.outgoing.push(part.sequence, packet_index, part);
            }
            if opens && self.state == ChannelState::Closed {
                self.state = ChannelState::OpenPending;
            }
            if closes {
                info!("Channel {} closing (dormant: {})", self.index, self.dormant);
                self.state = ChannelState::Closing;
            }
        }

        // parts is never empty
        Ok(range.unwrap_or_else(|| PacketIdRange::single(0)))
    }

    /// Accepts one message off the wire and returns every message it
    /// completes, in sequence order
    pub fn receive(&mut self, message: Message) -> Result<Vec<Message>, ChannelError> {
        trace_message("received", self.index, &message);

        if self.finished {
            debug!("Channel {} ignoring message after close", self.index);
            return Ok(Vec::new());
        }

        let ordered = if message.reliable {
            self.receiver.receive(message)?
        } else {
            if self.state == ChannelState::Closed && !message.open && !message.is_partial() {
                debug!("Channel {} dropping unreliable message before open", self.index);
                return Ok(Vec::new());
            }
            vec![message]
        };

        let mut complete = Vec::new();
        for message in ordered {
            let Some(message) = self.partials.receive(message)? else {
                continue;
            };
            if message.open && self.state == ChannelState::Closed {
                info!("Channel {} opened by remote", self.index);
                self.state = ChannelState::Open;
            }
            if self.state == ChannelState::Closed {
                debug!("Channel {} dropping message before open", self.index);
                continue;
            }
            if message.close {
                info!("Channel {} closed by remote (dormant: {})", self.index, message.dormant);
                self.dormant = message.dormant;
                self.state = ChannelState::Closed;
                self.finished = true;
                self.partials.reset();
                complete.push(message);
                break;
            }
            complete.push(message);
        }
        Ok(complete)
    }

    /// Records acknowledgment of a packet, retiring reliable messages in order
    pub fn notify_packet_delivered(&mut self, packet_index: PacketIndex) -> ChannelAck {
        let mut outcome = ChannelAck::default();

        self.outgoing.mark_delivered(packet_index);

        if !self.open_acked && !self.open_sequences.is_empty() {
            let outgoing = &self.outgoing;
            self.open_sequences.retain(|sequence| outgoing.is_outstanding(*sequence));
            if self.open_sequences.is_empty() {
                self.open_acked = true;
                outcome.open_acked = true;
                if self.state == ChannelState::OpenPending {
                    self.state = ChannelState::Open;
                }
                info!("Channel {} open acknowledged", self.index);
            }
        }

        let retired = self.outgoing.retire_acked();
        if !retired.is_empty() {
            debug!("Channel {} retired {} reliable message(s)", self.index, retired.len());
        }

        if self.state == ChannelState::Closing && self.outgoing.is_empty() {
            info!("Channel {} close acknowledged", self.index);
            self.state = ChannelState::Closed;
            self.finished = true;
            outcome.closed = true;
        }
        outcome
    }

    /// Resends every unacknowledged reliable message that went out on the
    /// dropped packet, unmodified. Returns how many were resent.
    pub fn notify_packet_dropped(
        &mut self,
        connection: &mut dyn Connection,
        packet_index: PacketIndex,
    ) -> usize {
        let index = self.index;
        let mut resent = 0;
        for record in self.outgoing.unacked_in_packet(packet_index) {
            trace_message("resending", index, &record.message);
            record.packet_index = connection.send_message(index, &record.message);
            resent += 1;
        }
        if resent > 0 {
            debug!(
                "Channel {} resent {} reliable message(s) from packet {}",
                index, resent, packet_index
            );
        }
        resent
    }
}
