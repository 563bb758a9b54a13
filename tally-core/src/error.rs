//! Domain-specific error types for the tally protocol and client.
//!
//! All fallible operations return `Result<T, TallyError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the tally protocol.
#[derive(Debug, Error)]
pub enum TallyError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the TLY0 magic sequence.
    #[error("invalid magic bytes: expected TLY0")]
    InvalidMagic,

    /// A field in the frame header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The frame payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Frame Errors ─────────────────────────────────────────────
    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The remote closed the connection before answering a request.
    #[error("endpoint closed")]
    EndpointClosed,

    // ── Resolution Errors ────────────────────────────────────────
    /// The remote accepted the connection but never sent its greeting.
    #[error("no greeting from {0}")]
    NoGreeting(String),

    /// The resolved endpoint does not implement the expected service.
    #[error("capability mismatch: missing {missing:?}")]
    CapabilityMismatch { missing: Vec<String> },

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Application Errors ───────────────────────────────────────
    /// A command string could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for TallyError {
    fn from(s: String) -> Self {
        TallyError::Other(s)
    }
}

impl From<&str> for TallyError {
    fn from(s: &str) -> Self {
        TallyError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TallyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        TallyError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for TallyError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        TallyError::EndpointClosed
    }
}

impl From<Box<bincode::ErrorKind>> for TallyError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        TallyError::Encoding(e.to_string())
    }
}
