use replica_serde::SerdeErr;
use thiserror::Error;

use crate::{channel::ChannelError, replication::ReplicationError};

/// Errors surfaced by a `ReplicationConnection`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// A message off the wire could not be framed
    #[error("Malformed message on channel {channel}: {source}")]
    MalformedMessage {
        channel: u16,
        #[source]
        source: SerdeErr,
    },

    /// The object asked to replicate is not in the world
    #[error("Object {object} is not in the world")]
    ObjectNotFound { object: u64 },

    #[error("No channel is open for object {object}")]
    ChannelNotFound { object: u64 },

    /// A fatal error already closed this connection
    #[error("Connection is closed")]
    Closed,
}

impl ConnectionError {
    /// True for errors that close the connection
    pub fn is_fatal(&self) -> bool {
        match self {
            ConnectionError::Channel(err) => err.is_fatal(),
            ConnectionError::Replication(err) => err.is_fatal(),
            ConnectionError::MalformedMessage { .. } => true,
            ConnectionError::ObjectNotFound { .. }
            | ConnectionError::ChannelNotFound { .. }
            | ConnectionError::Closed => false,
        }
    }
}
