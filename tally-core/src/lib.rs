//! # tally-core
//!
//! Core library for the tally remote-arithmetic system: a resilient
//! client that submits add/subtract tasks to a stateless compute
//! service and survives service restarts, network drops, and transient
//! unavailability without losing accepted work.
//!
//! This crate contains:
//! - **Protocol types**: `FrameHeader`, `Frame`, `MessageType`,
//!   `Operation`, `Task` and the bincode wire payloads
//! - **Codec**: `TallyCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` for managed TCP connections with
//!   heartbeat, `Endpoint` for request correlation and loss detection,
//!   and the `Resolver` seam that turns (host, port) into an endpoint
//! - **State**: the client state machine — a pure, total transition
//!   function over Disconnected / Connecting / Running — plus its
//!   pending-task queue and retry policy
//! - **Client**: `TallyClient`, the driver that runs the machine on a
//!   tokio task and interprets its effects
//! - **Error**: `TallyError` — typed, `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod network;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientHandle, ClientOptions, ClientOutput, TallyClient};
pub use codec::TallyCodec;
pub use error::TallyError;
pub use frame::{Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use header::{FrameHeader, HEADER_LEN};
pub use message::{ExecuteReply, ExecuteRequest, Hello, MessageType, Operation, SERVICE_CAPABILITIES, Task};
pub use network::{Connection, ConnectionInfo, ConnectionSender, Endpoint, EndpointHandle, EndpointId, PendingRequest, Resolved, Resolver, TcpResolver};
pub use state::{ClientCore, Effect, Event, Phase, RetryPolicy, Submission, TaskQueue};
