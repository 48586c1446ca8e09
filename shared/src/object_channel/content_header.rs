use replica_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

use crate::types::NetId;

/// Written at the front of a channel's open message so the remote host can
/// spawn the object
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SpawnHeader {
    pub net_id: NetId,
    pub class: String,
}

impl Serde for SpawnHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.net_id.ser(writer);
        self.class.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let net_id = NetId::de(reader)?;
        let class = String::de(reader)?;
        Ok(Self { net_id, class })
    }

    fn bit_length(&self) -> u32 {
        self.net_id.bit_length() + self.class.bit_length()
    }
}

/// Leads every block of an object channel message
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BlockHeader {
    /// Properties of the channel's own object
    Root,
    /// Properties of a sub-object. `class` is sent the first time the
    /// sub-object is mentioned on the channel.
    SubObject {
        net_id: NetId,
        outer: NetId,
        class: Option<String>,
    },
    /// The sub-object was destroyed; no payload follows
    Deleted { net_id: NetId },
}

impl BlockHeader {
    pub fn has_payload(&self) -> bool {
        !matches!(self, BlockHeader::Deleted { .. })
    }
}

impl Serde for BlockHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            BlockHeader::Root => writer.write_bit(true),
            BlockHeader::SubObject {
                net_id,
                outer,
                class,
            } => {
                writer.write_bit(false);
                net_id.ser(writer);
                outer.ser(writer);
                class.ser(writer);
            }
            BlockHeader::Deleted { net_id } => {
                writer.write_bit(false);
                net_id.ser(writer);
                NetId::INVALID.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            return Ok(BlockHeader::Root);
        }
        let net_id = NetId::de(reader)?;
        let outer = NetId::de(reader)?;
        if !outer.is_valid() {
            return Ok(BlockHeader::Deleted { net_id });
        }
        let class = Option::<String>::de(reader)?;
        Ok(BlockHeader::SubObject {
            net_id,
            outer,
            class,
        })
    }

    fn bit_length(&self) -> u32 {
        match self {
            BlockHeader::Root => 1,
            BlockHeader::SubObject {
                net_id,
                outer,
                class,
            } => 1 + net_id.bit_length() + outer.bit_length() + class.bit_length(),
            BlockHeader::Deleted { net_id } => {
                1 + net_id.bit_length() + NetId::INVALID.bit_length()
            }
        }
    }
}

/// Appends a block payload prefixed with its bit length
pub(crate) fn write_block_payload(writer: &mut dyn BitWrite, bytes: &[u8], bits: u32) {
    UnsignedVariableInteger::<7>::new(bits).ser(writer);
    writer.write_bits(bytes, bits);
}

/// Reads a payload written by `write_block_payload`
pub(crate) fn read_block_payload(reader: &mut BitReader) -> Result<(Vec<u8>, u32), SerdeErr> {
    let bits = UnsignedVariableInteger::<7>::de(reader)?.get();
    let bits = u32::try_from(bits).map_err(|_| SerdeErr::ValueOutOfRange { value: bits, bits: 32 })?;
    let bytes = reader.read_bits(bits)?;
    Ok((bytes, bits))
}
