mod context;
mod dormancy;
mod error;
mod replication_connection;
mod resolver;
mod transport;
mod world;

pub use context::{ReceiveContext, SendContext};
pub use dormancy::DormancyTable;
pub use error::ConnectionError;
pub use replication_connection::ReplicationConnection;
pub use resolver::ReferenceResolver;
pub use transport::{Connection, PacketNotifiable};
pub use world::ObjectWorld;
