use thiserror::Error;

use crate::types::{ChannelIndex, MessageIndex};

/// Errors raised by the channel framing layer. Every variant except
/// `ChannelClosed` is a protocol violation that tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Too many reliable messages are waiting for acknowledgment
    #[error("Channel {channel} reliable backlog overflow: {outstanding} outstanding + {incoming} new message(s) exceeds the limit of {limit}")]
    ReliableBacklogOverflow {
        channel: ChannelIndex,
        outstanding: usize,
        incoming: usize,
        limit: usize,
    },

    /// Too many out-of-order reliable messages were buffered on receive
    #[error("Channel {channel} incoming reliable buffer overflow at sequence {sequence}: {buffered} message(s) already queued")]
    IncomingBufferOverflow {
        channel: ChannelIndex,
        sequence: MessageIndex,
        buffered: usize,
    },

    /// A new partial sequence started before a reliable one finished
    #[error("Channel {channel} received a new partial sequence at {sequence} while a reliable partial sequence was incomplete")]
    PartialSequenceInterrupted {
        channel: ChannelIndex,
        sequence: MessageIndex,
    },

    /// A reliable continuation did not follow its predecessor
    #[error("Channel {channel} reliable partial out of sequence: expected {expected}, received {received}")]
    PartialSequenceBroken {
        channel: ChannelIndex,
        expected: MessageIndex,
        received: MessageIndex,
    },

    /// A reliable continuation arrived with no initial partial
    #[error("Channel {channel} received reliable partial {sequence} with no initial partial")]
    PartialWithoutInitial {
        channel: ChannelIndex,
        sequence: MessageIndex,
    },

    /// Reassembled message exceeded the configured size
    #[error("Channel {channel} partial reassembly reached {bytes} bytes, over the limit of {limit}")]
    PartialTooLarge {
        channel: ChannelIndex,
        bytes: usize,
        limit: usize,
    },

    /// The transport's message budget cannot hold even one byte of payload
    #[error("Transport budget of {budget_bits} bits is too small to carry a message")]
    BudgetTooSmall { budget_bits: u32 },

    /// A message was sent on a channel that already sent its close
    #[error("Channel {channel} is closed")]
    ChannelClosed { channel: ChannelIndex },
}

impl ChannelError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::ChannelClosed { .. })
    }
}
