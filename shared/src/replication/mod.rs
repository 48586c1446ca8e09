mod agent;
mod change_list;
mod compare;
mod condition;
mod custom_delta;
mod error;
mod history;
mod notify;
mod reader;
mod replica;
mod rpc;
mod shared_change_cache;
mod snapshot;
mod writer;

pub mod schema;

pub use agent::ReplicationAgent;
pub use change_list::ChangeList;
pub use condition::{RepCondition, ReplicationFlags};
pub use custom_delta::NetDeltaSerialize;
pub use error::ReplicationError;
pub use history::ChangeHistory;
pub use notify::RepNotify;
pub use replica::Replica;
pub use rpc::{
    net_deserialize_struct, net_serialize_struct, receive_properties_for_rpc,
    send_properties_for_rpc,
};
pub use shared_change_cache::{SharedChangeCache, SharedChangeCaches};
pub use snapshot::ReplicationSnapshot;
