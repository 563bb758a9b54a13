pub mod connection;
pub mod endpoint;
pub mod resolver;

pub use connection::{Connection, ConnectionInfo, ConnectionSender};
pub use endpoint::{Endpoint, EndpointHandle, EndpointId, PendingRequest};
pub use resolver::{Resolved, Resolver, TcpResolver};
