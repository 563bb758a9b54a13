//! Name resolution: turn a (host, port) pair into a live endpoint and
//! its capability mismatch set.

use async_trait::async_trait;
use tracing::debug;

use crate::error::TallyError;
use crate::message::{MessageType, SERVICE_CAPABILITIES};
use crate::network::connection::{Connection, ConnectionInfo};
use crate::network::endpoint::Endpoint;

/// Outcome of a successful resolution.
///
/// A non-empty `mismatches` set means the address answered, but with a
/// service that does not implement everything the client expects; the
/// caller is expected to discard the endpoint in that case.
#[derive(Debug)]
pub struct Resolved {
    pub endpoint: Endpoint,
    pub mismatches: Vec<String>,
}

/// The transport/name-resolution seam the client core calls through.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, host: &str, port: u16) -> Result<Resolved, TallyError>;
}

/// TCP resolver: dial, await the service greeting, compare capabilities.
#[derive(Debug, Default)]
pub struct TcpResolver;

#[async_trait]
impl Resolver for TcpResolver {
    /// Resolve `(host, port)` into a live endpoint.
    ///
    /// The wait is unbounded by design: resolution is a single, rare,
    /// user-triggered operation, and the user can always issue another
    /// `connect` to supersede a stuck one.
    async fn resolve(&self, host: &str, port: u16) -> Result<Resolved, TallyError> {
        let info = ConnectionInfo::new(host.to_string(), port);
        let mut conn = Connection::connect(&info).await?;
        debug!("connected to {info}, awaiting greeting");

        // The service speaks first. Skip keep-alives until the greeting
        // arrives; anything else is not the service we are looking for.
        let hello = loop {
            let frame = match conn.recv().await {
                Some(frame) => frame,
                None => return Err(TallyError::NoGreeting(info.to_socket_string())),
            };
            match frame.message_type() {
                Ok(MessageType::Hello) => break frame.decode_hello()?,
                Ok(MessageType::Heartbeat) => continue,
                _ => return Err(TallyError::NoGreeting(info.to_socket_string())),
            }
        };

        let mismatches: Vec<String> = SERVICE_CAPABILITIES
            .iter()
            .filter(|expected| !hello.capabilities.iter().any(|c| c == *expected))
            .map(|s| s.to_string())
            .collect();

        debug!(
            "resolved {info}: {} capabilities, {} missing",
            hello.capabilities.len(),
            mismatches.len()
        );
        Ok(Resolved {
            endpoint: Endpoint::new(conn, info),
            mismatches,
        })
    }
}
