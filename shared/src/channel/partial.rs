use log::warn;
use replica_serde::{BitWrite, BitWriter};

use crate::{
    channel::{
        error::ChannelError,
        message::{Message, PartialKind},
    },
    types::{ChannelIndex, MessageIndex},
};

/// Splits an oversized message into partials of at most `chunk_bits` payload
/// bits each. `chunk_bits` must be a whole number of bytes. The initial partial
/// carries the open flag, the final partial carries close and dormant, and
/// sequences are left for the channel to assign.
pub(crate) fn split_message(message: &Message, chunk_bits: u32) -> Vec<Message> {
    let chunk_bytes = (chunk_bits / 8).max(1) as usize;
    let chunk_bits = (chunk_bytes * 8) as u32;
    let total_bits = message.payload_bits();
    let payload = message.payload();

    let mut parts = Vec::new();
    let mut consumed: u32 = 0;
    let mut index = 0;
    while consumed < total_bits {
        let bits = (total_bits - consumed).min(chunk_bits);
        let start = index * chunk_bytes;
        let end = (start + bits.div_ceil(8) as usize).min(payload.len());
        parts.push(Message::new(payload[start..end].to_vec(), bits).with_reliable(message.reliable));
        consumed += bits;
        index += 1;
    }

    let count = parts.len();
    for (i, part) in parts.iter_mut().enumerate() {
        part.partial = Some(if i == 0 {
            PartialKind::Initial
        } else if i + 1 == count {
            PartialKind::Final
        } else {
            PartialKind::Continuation
        });
    }
    if let Some(first) = parts.first_mut() {
        first.open = message.open;
    }
    if let Some(last) = parts.last_mut() {
        last.close = message.close;
        last.dormant = message.dormant;
    }
    parts
}

struct InProgress {
    reliable: bool,
    open: bool,
    last_sequence: MessageIndex,
    writer: BitWriter,
}

/// Rebuilds messages from partials. Holds at most one sequence in progress.
pub(crate) struct PartialAccumulator {
    channel: ChannelIndex,
    max_bytes: usize,
    in_progress: Option<InProgress>,
}

impl PartialAccumulator {
    pub fn new(channel: ChannelIndex, max_bytes: usize) -> Self {
        Self {
            channel,
            max_bytes,
            in_progress: None,
        }
    }

    /// True while a partial sequence has started but not finished
    pub fn is_pending(&self) -> bool {
        self.in_progress.is_some()
    }

    pub fn pending_bits(&self) -> u32 {
        self.in_progress
            .as_ref()
            .map(|progress| progress.writer.bits_written())
            .unwrap_or(0)
    }

    /// Feeds one partial. Returns the rebuilt message once its final partial
    /// arrives.
    pub fn receive(&mut self, message: Message) -> Result<Option<Message>, ChannelError> {
        let Some(kind) = message.partial else {
            return Ok(Some(message));
        };

        if kind == PartialKind::Initial {
            if let Some(progress) = &self.in_progress {
                if progress.reliable && !message.reliable {
                    warn!(
                        "Channel {} dropping unreliable partial {} during reliable partial sequence",
                        self.channel, message.sequence
                    );
                    return Ok(None);
                }
                if progress.reliable {
                    return Err(ChannelError::PartialSequenceInterrupted {
                        channel: self.channel,
                        sequence: message.sequence,
                    });
                }
                warn!(
                    "Channel {} discarding incomplete unreliable partial sequence ending at {}",
                    self.channel, progress.last_sequence
                );
            }
            self.in_progress = Some(InProgress {
                reliable: message.reliable,
                open: message.open,
                last_sequence: message.sequence,
                writer: BitWriter::with_capacity(message.payload().len() * 2),
            });
            return self.append(&message).map(|_| None);
        }

        let Some(progress) = &self.in_progress else {
            if message.reliable {
                return Err(ChannelError::PartialWithoutInitial {
                    channel: self.channel,
                    sequence: message.sequence,
                });
            }
            warn!(
                "Channel {} dropping unreliable partial {} with no initial partial",
                self.channel, message.sequence
            );
            return Ok(None);
        };

        if progress.reliable && !message.reliable {
            warn!(
                "Channel {} dropping unreliable partial {} during reliable partial sequence",
                self.channel, message.sequence
            );
            return Ok(None);
        }

        let expected = progress.last_sequence.wrapping_add(1);
        if message.sequence != expected || message.reliable != progress.reliable {
            if message.reliable || progress.reliable {
                return Err(ChannelError::PartialSequenceBroken {
                    channel: self.channel,
                    expected,
                    received: message.sequence,
                });
            }
            warn!(
                "Channel {} discarding unreliable partial sequence: expected {}, received {}",
                self.channel, expected, message.sequence
            );
            self.in_progress = None;
            return Ok(None);
        }

        self.append(&message)?;

        if kind != PartialKind::Final {
            return Ok(None);
        }

        let Some(progress) = self.in_progress.take() else {
            return Ok(None);
        };
        let mut rebuilt = Message::from_writer(progress.writer).with_reliable(progress.reliable);
        rebuilt.sequence = message.sequence;
        rebuilt.open = progress.open;
        rebuilt.close = message.close;
        rebuilt.dormant = message.dormant;
        Ok(Some(rebuilt))
    }

    pub fn reset(&mut self) {
        self.in_progress = None;
    }

    fn append(&mut self, message: &Message) -> Result<(), ChannelError> {
        let channel = self.channel;
        let max_bytes = self.max_bytes;
        let Some(progress) = self.in_progress.as_mut() else {
            return Ok(());
        };
        let bytes = (progress.writer.bits_written() + message.payload_bits()).div_ceil(8) as usize;
        if bytes > max_bytes {
            self.in_progress = None;
            return Err(ChannelError::PartialTooLarge {
                channel,
                bytes,
                limit: max_bytes,
            });
        }
        progress
            .writer
            .write_bits(message.payload(), message.payload_bits());
        progress.last_sequence = message.sequence;
        Ok(())
    }
}
