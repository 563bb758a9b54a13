//! Live remote endpoints: request correlation, bounded waits, and
//! connection-loss detection.
//!
//! The state machine only ever sees [`EndpointHandle`] — plain,
//! comparable data. The live I/O object ([`Endpoint`]) stays with the
//! driver, so the machine can be tested without a socket in sight.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::error::TallyError;
use crate::frame::Frame;
use crate::message::{MessageType, Operation, Task};
use crate::network::connection::{Connection, ConnectionInfo, ConnectionSender};

/// Process-wide endpoint generation counter. Every resolved endpoint gets
/// a fresh id, so a handle never aliases an earlier server instance.
static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

// ── EndpointId / EndpointHandle ──────────────────────────────────

/// Opaque, comparable identity of one resolved server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    /// Fabricate an id without a live endpoint; state-machine tests
    /// only need identity, never I/O.
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The state machine's view of a remote: identity plus address.
///
/// Valid until the instance it names becomes unreachable; comparing
/// handles compares instances, not addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    id: EndpointId,
    addr: ConnectionInfo,
}

impl EndpointHandle {
    pub(crate) fn from_parts(id: EndpointId, addr: ConnectionInfo) -> Self {
        Self { id, addr }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn addr(&self) -> &ConnectionInfo {
        &self.addr
    }
}

impl std::fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

// ── Endpoint ─────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<i64>>>>;

/// A live, cheaply cloneable remote service instance.
///
/// A router task matches inbound `Response` frames to pending requests.
/// When the connection dies the pending table is cleared (outstanding
/// waits fail immediately) and the closed flag flips —
/// [`closed`](Self::closed) is the failure-detector primitive the
/// client monitors.
#[derive(Debug, Clone)]
pub struct Endpoint {
    handle: EndpointHandle,
    tx: ConnectionSender,
    pending: PendingMap,
    next_request_id: Arc<AtomicU64>,
    closed_rx: watch::Receiver<bool>,
}

impl Endpoint {
    /// Wrap an established connection. Takes over its inbound stream.
    pub fn new(conn: Connection, addr: ConnectionInfo) -> Self {
        let handle = EndpointHandle {
            id: EndpointId(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed)),
            addr,
        };
        let (tx, rx) = conn.into_parts();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(Self::route(handle.id, rx, Arc::clone(&pending), closed_tx));

        Self {
            handle,
            tx,
            pending,
            next_request_id: Arc::new(AtomicU64::new(1)),
            closed_rx,
        }
    }

    async fn route(
        id: EndpointId,
        mut rx: mpsc::Receiver<Frame>,
        pending: PendingMap,
        closed_tx: watch::Sender<bool>,
    ) {
        while let Some(frame) = rx.recv().await {
            match frame.message_type() {
                Ok(MessageType::Response) => {
                    let reply = match frame.decode_response() {
                        Ok(reply) => reply,
                        Err(e) => {
                            debug!("endpoint {id}: undecodable response: {e}");
                            continue;
                        }
                    };
                    match pending.lock().await.remove(&frame.request_id()) {
                        Some(waiter) => {
                            // Waiter may have timed out already; that is fine.
                            let _ = waiter.send(reply.value);
                        }
                        None => trace!(
                            "endpoint {id}: response for unknown request {}",
                            frame.request_id()
                        ),
                    }
                }
                Ok(MessageType::Heartbeat) => trace!("endpoint {id}: heartbeat"),
                Ok(other) => debug!("endpoint {id}: unexpected {other} frame"),
                Err(e) => debug!("endpoint {id}: {e}"),
            }
        }
        // Connection gone. Drop all waiters so outstanding requests fail
        // fast instead of waiting out their timeout, then flip the flag.
        pending.lock().await.clear();
        let _ = closed_tx.send(true);
        debug!("endpoint {id}: closed");
    }

    pub fn id(&self) -> EndpointId {
        self.handle.id
    }

    pub fn handle(&self) -> &EndpointHandle {
        &self.handle
    }

    /// Issue a request for `task`. The frame is sent before this returns,
    /// so call order is issuance order; the reply is awaited separately
    /// via [`PendingRequest::wait`].
    pub async fn begin(&self, task: Task) -> Result<PendingRequest, TallyError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::request(request_id, task)?;

        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, waiter_tx);
        if self.tx.send(frame).await.is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(TallyError::ChannelClosed);
        }

        Ok(PendingRequest {
            request_id,
            rx: waiter_rx,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Issue a request and wait for its answer under a bounded timeout.
    pub async fn execute(
        &self,
        op: Operation,
        lhs: i64,
        rhs: i64,
        timeout: Duration,
    ) -> Result<i64, TallyError> {
        self.begin(Task::new(op, lhs, rhs)).await?.wait(timeout).await
    }

    /// Resolves once the underlying connection is gone. Fires at most
    /// once per endpoint; a monitor that outlives the endpoint's owner
    /// still completes.
    pub async fn closed(&self) {
        self.closed_signal().wait().await;
    }

    /// A detached subscription to this endpoint's death.
    ///
    /// Holds no sender halves, so an abandoned endpoint can still wind
    /// down (and fire the signal) while a monitor waits on it.
    pub fn closed_signal(&self) -> ClosedSignal {
        ClosedSignal {
            id: self.handle.id,
            rx: self.closed_rx.clone(),
        }
    }

    /// Current number of requests awaiting an answer.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

// ── ClosedSignal ─────────────────────────────────────────────────

/// A failure-detection subscription for one endpoint.
#[derive(Debug)]
pub struct ClosedSignal {
    id: EndpointId,
    rx: watch::Receiver<bool>,
}

impl ClosedSignal {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Wait until the endpoint is gone; returns its id.
    pub async fn wait(mut self) -> EndpointId {
        // An Err means the router task is gone, which implies closed.
        let _ = self.rx.wait_for(|closed| *closed).await;
        self.id
    }
}

// ── PendingRequest ───────────────────────────────────────────────

/// An issued request whose answer has not arrived yet.
#[derive(Debug)]
pub struct PendingRequest {
    request_id: u64,
    rx: oneshot::Receiver<i64>,
    pending: PendingMap,
}

impl PendingRequest {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the answer, at most `timeout`. A timed-out request is
    /// deregistered so a late answer is discarded at this layer.
    pub async fn wait(self, timeout: Duration) -> Result<i64, TallyError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TallyError::EndpointClosed),
            Err(_) => {
                self.pending.lock().await.remove(&self.request_id);
                Err(TallyError::Timeout(timeout))
            }
        }
    }
}
