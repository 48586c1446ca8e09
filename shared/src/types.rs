use replica_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

use crate::wrapping_number::sequence_less_than;

pub type PacketIndex = u16;
pub type MessageIndex = u16;
pub type ChannelIndex = u16;

/// Local handle of a replicated object in the host's world
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(u64);

impl ObjectKey {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Connection-agnostic identity assigned to an object by the reference resolver.
/// Zero is reserved as the invalid identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(u32);

impl NetId {
    pub const INVALID: NetId = NetId(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Serde for NetId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        let value = u32::try_from(value).map_err(|_| SerdeErr::ValueOutOfRange { value, bits: 32 })?;
        Ok(Self(value))
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

/// Inclusive range of packets a message (or its partials) went out on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketIdRange {
    pub first: PacketIndex,
    pub last: PacketIndex,
}

impl PacketIdRange {
    pub fn new(first: PacketIndex, last: PacketIndex) -> Self {
        Self { first, last }
    }

    pub fn single(packet_index: PacketIndex) -> Self {
        Self::new(packet_index, packet_index)
    }

    pub fn contains(&self, packet_index: PacketIndex) -> bool {
        !sequence_less_than(packet_index, self.first) && !sequence_less_than(self.last, packet_index)
    }

    /// True once an ack for `packet_index` covers the whole range
    pub fn is_acked_by(&self, packet_index: PacketIndex) -> bool {
        !sequence_less_than(packet_index, self.last)
    }

    pub fn extend_to(&mut self, packet_index: PacketIndex) {
        self.last = packet_index;
    }

    pub fn packets(&self) -> impl Iterator<Item = PacketIndex> {
        let first = self.first;
        let count = self.last.wrapping_sub(self.first) as u32 + 1;
        (0..count).map(move |offset| first.wrapping_add(offset as u16))
    }
}
