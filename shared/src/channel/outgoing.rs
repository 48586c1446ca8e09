use std::collections::VecDeque;

use crate::{
    channel::message::Message,
    types::{MessageIndex, PacketIndex},
};

pub(crate) struct SentMessage {
    pub sequence: MessageIndex,
    pub packet_index: PacketIndex,
    pub message: Message,
    pub acked: bool,
}

/// Reliable messages awaiting acknowledgment, oldest first. Acked records
/// are retired only from the front so retirement happens in send order.
pub(crate) struct OutgoingReliable {
    queue: VecDeque<SentMessage>,
}

impl OutgoingReliable {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn push(&mut self, sequence: MessageIndex, packet_index: PacketIndex, message: Message) {
        self.queue.push_back(SentMessage {
            sequence,
            packet_index,
            message,
            acked: false,
        });
    }

    pub fn mark_delivered(&mut self, packet_index: PacketIndex) {
        for record in self.queue.iter_mut() {
            if record.packet_index == packet_index {
                record.acked = true;
            }
        }
    }

    pub fn retire_acked(&mut self) -> Vec<SentMessage> {
        let mut retired = Vec::new();
        while self.queue.front().is_some_and(|record| record.acked) {
            if let Some(record) = self.queue.pop_front() {
                retired.push(record);
            }
        }
        retired
    }

    /// True if `sequence` was sent and has not been acknowledged yet
    pub fn is_outstanding(&self, sequence: MessageIndex) -> bool {
        self.queue
            .iter()
            .any(|record| record.sequence == sequence && !record.acked)
    }

    /// Unacked records that went out on `packet_index`
    pub fn unacked_in_packet(
        &mut self,
        packet_index: PacketIndex,
    ) -> impl Iterator<Item = &mut SentMessage> {
        self.queue
            .iter_mut()
            .filter(move |record| !record.acked && record.packet_index == packet_index)
    }
}
