use replica_serde::SerdeErr;
use thiserror::Error;

use crate::replication::schema::SchemaError;

/// Errors raised by diffing, serializing and receiving replicated properties
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    // Protocol Violations

    /// A received handle does not belong to the scope being read
    #[error("Schema {schema} received handle {handle} out of sequence (scope holds {max_handle})")]
    HandleOutOfSequence {
        schema: String,
        handle: u32,
        max_handle: u32,
    },

    /// A received array length exceeds the configured bound
    #[error("Schema {schema} received array {field} of length {length}, over the limit of {limit}")]
    ArrayTooLarge {
        schema: String,
        field: String,
        length: usize,
        limit: usize,
    },

    /// The per-handle marker did not match
    #[error("Schema {schema} checksum mismatch after handle {handle}: read {found:#010x}")]
    ChecksumMismatch {
        schema: String,
        handle: u32,
        found: u32,
    },

    /// The stream ended or held an invalid value
    #[error("Schema {schema} failed to decode: {source}")]
    Decode {
        schema: String,
        #[source]
        source: SerdeErr,
    },

    /// A custom delta block named a property that has no delta serializer
    #[error("Schema {schema} received custom delta for unknown property index {parent}")]
    UnknownCustomDelta { schema: String, parent: usize },

    /// A spawn header named a class this host never registered
    #[error("Received spawn of unknown class {class}")]
    UnknownClass { class: String },

    /// A sub-object block named an identity with no local object and no class
    #[error("Received update for unknown sub-object {net_id}")]
    UnknownSubObject { net_id: u32 },

    // Local Errors

    /// The object is already in the middle of a replication pass
    #[error("Object {object} is already being replicated")]
    ReentrantReplication { object: u64 },

    /// A previous holder of the shared change cache panicked
    #[error("Shared change cache of object {object} is poisoned")]
    CachePoisoned { object: u64 },

    /// A change list did not follow the schema
    #[error("Schema {schema} change list is malformed at entry {position}")]
    ChangeListMalformed { schema: String, position: usize },

    /// A slot held a value of the wrong type for its field
    #[error("Field {field} of {schema} expects {expected}, found {found}")]
    ValueKindMismatch {
        schema: String,
        field: String,
        expected: String,
        found: &'static str,
    },

    /// No replicated field has this name
    #[error("Schema {schema} has no field named {field}")]
    UnknownField { schema: String, field: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ReplicationError {
    /// True for errors that mean sender and receiver have lost sync
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplicationError::HandleOutOfSequence { .. }
                | ReplicationError::ArrayTooLarge { .. }
                | ReplicationError::ChecksumMismatch { .. }
                | ReplicationError::Decode { .. }
                | ReplicationError::UnknownCustomDelta { .. }
                | ReplicationError::UnknownClass { .. }
                | ReplicationError::UnknownSubObject { .. }
        )
    }
}
