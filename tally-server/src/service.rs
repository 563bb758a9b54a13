//! The stateless compute service.
//!
//! Accepts any number of client connections; each gets a greeting
//! advertising the service capabilities, then a plain request/response
//! loop. Nothing is remembered between requests or across connections,
//! which is exactly what lets clients retry against a restarted server.

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use tally_core::{Connection, ConnectionInfo, Frame, Hello, MessageType, TallyError};

/// Listener wrapper that serves arithmetic until the process ends.
#[derive(Debug)]
pub struct TallyServer {
    listener: TcpListener,
}

impl TallyServer {
    /// Bind the listener.
    pub async fn bind(info: &ConnectionInfo) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(info.to_socket_string()).await?;
        Ok(Self { listener })
    }

    /// The actual bound address (relevant with port 0).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept loop: one spawned handler per connection.
    pub async fn run(self) -> Result<(), std::io::Error> {
        info!("serving on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("accepted {peer}");
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream).await {
                    warn!("connection {peer} ended with error: {e}");
                }
            });
        }
    }
}

/// Drive one client connection to completion.
///
/// Speaks first: the greeting is what resolvers use to check they found
/// the right kind of service.
pub async fn serve_connection(stream: TcpStream) -> Result<(), TallyError> {
    let mut conn = Connection::new(stream);
    conn.send(Frame::hello(&Hello::arithmetic())?).await?;

    while let Some(frame) = conn.recv().await {
        match frame.message_type() {
            Ok(MessageType::Request) => {
                let request = match frame.decode_request() {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("dropping undecodable request: {e}");
                        continue;
                    }
                };
                let value = request.op.apply(request.lhs, request.rhs);
                debug!(
                    "request {}: {} {} {} = {value}",
                    frame.request_id(),
                    request.lhs,
                    request.op,
                    request.rhs
                );
                conn.send(Frame::response(frame.request_id(), value)?).await?;
            }
            Ok(MessageType::Heartbeat) => {}
            Ok(other) => debug!("ignoring {other} frame"),
            Err(e) => debug!("ignoring unknown frame: {e}"),
        }
    }
    debug!("peer disconnected");
    Ok(())
}
