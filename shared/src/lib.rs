//! # Replica Shared
//! State replication engine: schema-driven property delta compression carried
//! over reliable/unreliable object channels.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use replica_serde::{
    BitReader, BitWrite, BitWriter, ConstBitLength, Serde, SerdeErr, SignedInteger,
    SignedVariableInteger, UnsignedInteger, UnsignedVariableInteger,
};

mod channel;
mod config;
mod connection;
mod object_channel;
pub mod replication;
mod sequence_list;
mod types;
mod wrapping_number;

pub use channel::{Channel, ChannelAck, ChannelError, ChannelState, Message, PartialKind, MESSAGE_HEADER_MAX_BITS};
pub use config::ReplicationConfig;
pub use connection::{
    Connection, ConnectionError, DormancyTable, ObjectWorld, PacketNotifiable, ReceiveContext,
    ReferenceResolver, ReplicationConnection, SendContext,
};
pub use object_channel::{ObjectChannel, ReplicationEvent};
pub use replication::{
    schema::{
        ClassDescriptor, FieldKind, FieldValue, FunctionDescriptor, ObjectRef, ObjectState, Plane,
        PropertyDescriptor, PropertySchema, PropertyType, RepNotifyPolicy, Rotator, SchemaError,
        SchemaKey, SchemaRegistry, StructDescriptor, StructSerializer, Vec3,
    },
    ChangeHistory, ChangeList, NetDeltaSerialize, RepCondition, RepNotify, Replica,
    ReplicationAgent, ReplicationError, ReplicationFlags, ReplicationSnapshot, SharedChangeCache,
    SharedChangeCaches,
};
pub use sequence_list::{SequenceError, SequenceList};
pub use types::{ChannelIndex, MessageIndex, NetId, ObjectKey, PacketIdRange, PacketIndex};
pub use wrapping_number::{
    sequence_greater_than, sequence_less_than, try_wrapping_diff, wrapping_diff,
    WrappingNumberError,
};
