mod base_object_channel;
mod content_header;
mod event;
mod subobject_keys;

pub use base_object_channel::ObjectChannel;
pub use event::ReplicationEvent;
