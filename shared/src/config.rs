/// Contains Config properties which will be used by a replication connection
/// and everything it owns
#[derive(Clone, Debug)]
pub struct ReplicationConfig {
    /// Maximum number of reliable messages that may be outstanding on one
    /// channel, and maximum number of out-of-order reliable messages buffered
    /// on receive. Exceeding either closes the connection.
    pub max_reliable_backlog: usize,
    /// Capacity of each snapshot's change-list history ring
    pub max_change_history: usize,
    /// Number of passes an unresolved object reference may stay pending
    /// before a warning is logged (and logged again every such interval)
    pub unmapped_frames_warning: u32,
    /// Largest message, in bytes, that partial reassembly will rebuild
    pub max_partial_bytes: usize,
    /// Largest container length accepted from the wire
    pub max_array_length: usize,
    /// Emits a marker after every property handle so a schema mismatch is
    /// caught at the first desynchronized field
    pub checksum_enabled: bool,
    /// Allows connections replicating the same object in the same frame to
    /// reuse one diff of its unconditional properties
    pub property_skip_enabled: bool,
    /// Number of slots in each object channel's sub-object nak map
    pub subobject_nak_buffer: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_reliable_backlog: 256,
            max_change_history: 32,
            unmapped_frames_warning: 100,
            max_partial_bytes: 64 * 1024,
            max_array_length: 2048,
            checksum_enabled: false,
            property_skip_enabled: true,
            subobject_nak_buffer: 64,
        }
    }
}
