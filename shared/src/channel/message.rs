use replica_serde::{BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedVariableInteger};

use crate::types::MessageIndex;

/// Upper bound on the bits `Message::write` spends before the payload
pub const MESSAGE_HEADER_MAX_BITS: u32 = 64;

/// Position of a message within a split sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartialKind {
    Initial,
    Continuation,
    Final,
}

/// One framed unit on a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Meaningful for reliable messages and for partials of any reliability
    pub sequence: MessageIndex,
    pub reliable: bool,
    pub open: bool,
    pub close: bool,
    pub dormant: bool,
    pub partial: Option<PartialKind>,
    payload: Vec<u8>,
    payload_bits: u32,
}

impl Message {
    pub fn new(payload: Vec<u8>, payload_bits: u32) -> Self {
        Self {
            sequence: 0,
            reliable: false,
            open: false,
            close: false,
            dormant: false,
            partial: None,
            payload,
            payload_bits,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    pub fn from_writer(writer: BitWriter) -> Self {
        let (payload, payload_bits) = writer.into_bits();
        Self::new(payload, payload_bits)
    }

    pub fn with_reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }

    pub fn with_open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn with_close(mut self, dormant: bool) -> Self {
        self.close = true;
        self.dormant = dormant;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_bits(&self) -> u32 {
        self.payload_bits
    }

    pub fn payload_reader(&self) -> BitReader<'_> {
        BitReader::with_bit_len(&self.payload, self.payload_bits)
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    fn has_sequence(&self) -> bool {
        self.reliable || self.partial.is_some()
    }

    /// Writes the message exactly as a connection puts it on the wire
    pub fn write(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(self.reliable);
        writer.write_bit(self.open);
        writer.write_bit(self.close);
        if self.close {
            writer.write_bit(self.dormant);
        }
        writer.write_bit(self.partial.is_some());
        if let Some(partial) = self.partial {
            writer.write_bit(partial == PartialKind::Initial);
            writer.write_bit(partial == PartialKind::Final);
        }
        if self.has_sequence() {
            self.sequence.ser(writer);
        }
        UnsignedVariableInteger::<7>::new(self.payload_bits).ser(writer);
        writer.write_bits(&self.payload, self.payload_bits);
    }

    pub fn read(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let reliable = reader.read_bit()?;
        let open = reader.read_bit()?;
        let close = reader.read_bit()?;
        let dormant = if close { reader.read_bit()? } else { false };
        let partial = if reader.read_bit()? {
            let initial = reader.read_bit()?;
            let last = reader.read_bit()?;
            Some(match (initial, last) {
                (true, _) => PartialKind::Initial,
                (false, true) => PartialKind::Final,
                (false, false) => PartialKind::Continuation,
            })
        } else {
            None
        };
        let sequence = if reliable || partial.is_some() {
            MessageIndex::de(reader)?
        } else {
            0
        };
        let payload_bits = UnsignedVariableInteger::<7>::de(reader)?.get();
        let payload_bits = u32::try_from(payload_bits).map_err(|_| SerdeErr::ValueOutOfRange {
            value: payload_bits,
            bits: 32,
        })?;
        let payload = reader.read_bits(payload_bits)?;

        Ok(Self {
            sequence,
            reliable,
            open,
            close,
            dormant,
            partial,
            payload,
            payload_bits,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(self.payload.len() + 8);
        self.write(&mut writer);
        writer.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerdeErr> {
        let mut reader = BitReader::new(bytes);
        Self::read(&mut reader)
    }
}
