use log::debug;

use crate::{
    channel::{error::ChannelError, message::Message},
    sequence_greater_than,
    sequence_list::SequenceList,
    types::{ChannelIndex, MessageIndex},
};

/// Releases reliable messages strictly in sequence order, holding back any
/// that arrive ahead of a gap
pub(crate) struct ReliableReceiver {
    channel: ChannelIndex,
    last_in_order: MessageIndex,
    buffer: SequenceList<Message>,
    capacity: usize,
}

impl ReliableReceiver {
    pub fn new(channel: ChannelIndex, capacity: usize) -> Self {
        Self {
            channel,
            last_in_order: 0,
            buffer: SequenceList::new(),
            capacity,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn receive(&mut self, message: Message) -> Result<Vec<Message>, ChannelError> {
        let expected = self.last_in_order.wrapping_add(1);
        let sequence = message.sequence;

        if sequence != expected {
            if !sequence_greater_than(sequence, expected) {
                debug!("Channel {} dropping stale reliable message {}", self.channel, sequence);
                return Ok(Vec::new());
            }
            if self.buffer.contains_scan_from_back(&sequence) {
                return Ok(Vec::new());
            }
            if self.buffer.len() >= self.capacity {
                return Err(ChannelError::IncomingBufferOverflow {
                    channel: self.channel,
                    sequence,
                    buffered: self.buffer.len(),
                });
            }
            // contains check above rules out the duplicate case
            let _ = self.buffer.try_insert_scan_from_back(sequence, message);
            debug!("Channel {} queued reliable message {} waiting for {}", self.channel, sequence, expected);
            return Ok(Vec::new());
        }

        let mut output = vec![message];
        self.last_in_order = expected;
        while let Some((next_sequence, _)) = self.buffer.front() {
            if *next_sequence != self.last_in_order.wrapping_add(1) {
                break;
            }
            if let Some((next_sequence, next)) = self.buffer.pop_front() {
                self.last_in_order = next_sequence;
                output.push(next);
            }
        }
        Ok(output)
    }
}
