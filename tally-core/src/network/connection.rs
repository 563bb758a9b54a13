//! Managed TCP connection: framed stream split into reader/writer tasks
//! with a periodic heartbeat.

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::TallyCodec;
use crate::frame::Frame;

/// Interval between keep-alive frames.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Sender half usable from spawned tasks.
pub type ConnectionSender = mpsc::Sender<Frame>;

/// A framed connection to a single peer.
///
/// Owns two background tasks bridging the socket and a pair of mpsc
/// channels, plus a heartbeat loop that stops once the handle is dropped.
#[derive(Debug)]
pub struct Connection {
    // Channel to send frames to the background writer task
    tx: mpsc::Sender<Frame>,
    // Channel to receive frames from the background reader task
    rx: mpsc::Receiver<Frame>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, TallyCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel(100);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel(100);

        // Writer task: User -> Network
        tokio::spawn(async move {
            while let Some(frame) = network_rx.recv().await {
                if let Err(e) = net_writer.send(frame).await {
                    warn!("network write error: {e}");
                    break;
                }
            }
        });

        // Reader task: Network -> User
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(frame) => {
                        if network_tx.send(frame).await.is_err() {
                            // user_rx was dropped, stop reading
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("network read error: {e}");
                        break;
                    }
                }
            }
            debug!("reader task finished");
        });

        // Heartbeat loop. Holds only a weak sender: once every user
        // handle is gone the writer channel closes and the connection
        // winds down instead of being kept alive by its own keep-alive.
        let heartbeat_tx = user_tx.downgrade();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tx) = heartbeat_tx.upgrade() else { break };
                if tx.send(Frame::heartbeat()).await.is_err() {
                    break;
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    pub async fn connect(info: &ConnectionInfo) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(info.to_socket_string()).await?;
        Ok(Self::new(stream))
    }

    pub async fn send(&self, frame: Frame) -> Result<(), mpsc::error::SendError<Frame>> {
        self.tx.send(frame).await
    }

    /// Next inbound frame; `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub fn sender(&self) -> ConnectionSender {
        self.tx.clone()
    }

    /// Split into the writer sender and the inbound receiver, consuming
    /// the handle. Used by layers that route inbound frames themselves.
    pub fn into_parts(self) -> (ConnectionSender, mpsc::Receiver<Frame>) {
        (self.tx, self.rx)
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// A (host, port) pair identifying a remote service address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
