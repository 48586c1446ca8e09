mod base_channel;
mod error;
mod message;
mod outgoing;
mod partial;
mod reliable_receiver;

pub use base_channel::{Channel, ChannelAck, ChannelState};
pub use error::ChannelError;
pub use message::{Message, PartialKind, MESSAGE_HEADER_MAX_BITS};
