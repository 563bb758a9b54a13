//! Protocol message types and the arithmetic task model.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.

use crate::error::TallyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability names the arithmetic service advertises in its greeting.
///
/// A resolver compares this list against what the remote actually
/// advertises; anything missing lands in the mismatch set.
pub const SERVICE_CAPABILITIES: [&str; 2] = ["arith.add", "arith.sub"];

// ── MessageType ──────────────────────────────────────────────────

/// Distinguishes the frame kinds exchanged between client and service.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Service greeting advertising its capability set.
    Hello = 0x1,
    /// An arithmetic request sent from client to service.
    Request = 0x2,
    /// A reply sent from service to client.
    Response = 0x3,
    /// Periodic keep-alive; carries no payload, request id 0.
    Heartbeat = 0x4,
}

impl TryFrom<u32> for MessageType {
    type Error = TallyError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(MessageType::Hello),
            0x2 => Ok(MessageType::Request),
            0x3 => Ok(MessageType::Response),
            0x4 => Ok(MessageType::Heartbeat),
            _ => Err(TallyError::UnknownVariant {
                type_name: "MessageType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Hello => write!(f, "Hello"),
            MessageType::Request => write!(f, "Request"),
            MessageType::Response => write!(f, "Response"),
            MessageType::Heartbeat => write!(f, "Heartbeat"),
        }
    }
}

// ── Operation ────────────────────────────────────────────────────

/// The arithmetic operations the remote service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Add,
    Subtract,
}

impl Operation {
    /// Evaluate the operation. Wrapping arithmetic keeps the service
    /// total on the full i64 range.
    pub fn apply(&self, lhs: i64, rhs: i64) -> i64 {
        match self {
            Operation::Add => lhs.wrapping_add(rhs),
            Operation::Subtract => lhs.wrapping_sub(rhs),
        }
    }

    /// The infix symbol used when printing results.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Task ─────────────────────────────────────────────────────────

/// One arithmetic task: an operation plus its two operands.
///
/// Immutable value — created when a submit command arrives, dispatched
/// exactly once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub op: Operation,
    pub lhs: i64,
    pub rhs: i64,
}

impl Task {
    pub fn new(op: Operation, lhs: i64, rhs: i64) -> Self {
        Self { op, lhs, rhs }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

// ── Wire payloads ────────────────────────────────────────────────

/// Payload of a `Hello` frame: the capability names the service implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub capabilities: Vec<String>,
}

impl Hello {
    /// The greeting the arithmetic service sends after accepting a
    /// connection.
    pub fn arithmetic() -> Self {
        Self {
            capabilities: SERVICE_CAPABILITIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Payload of a `Request` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub op: Operation,
    pub lhs: i64,
    pub rhs: i64,
}

impl From<Task> for ExecuteRequest {
    fn from(t: Task) -> Self {
        Self {
            op: t.op,
            lhs: t.lhs,
            rhs: t.rhs,
        }
    }
}

/// Payload of a `Response` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub value: i64,
}
