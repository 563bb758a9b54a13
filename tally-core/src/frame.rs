//! Frames: header + bincode payload, with payload checksums.

use crate::error::TallyError;
use crate::header::{FrameHeader, HEADER_LEN};
use crate::message::{ExecuteReply, ExecuteRequest, Hello, MessageType, Task};

/// Upper bound for a single frame payload. Arithmetic payloads are tiny;
/// the bound exists to reject garbage lengths before allocating.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Upper bound for a whole frame as seen by the codec.
pub const MAX_FRAME_SIZE: usize = HEADER_LEN + MAX_PAYLOAD_SIZE;

/// A single wire frame: fixed header plus bincode-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Vec<u8>,
}

fn payload_checksum(payload: &[u8]) -> Result<u32, TallyError> {
    let hash = blake3::hash(payload);
    let bytes: [u8; 4] = hash.as_bytes()[0..4]
        .try_into()
        .map_err(|_| TallyError::Encoding("checksum truncation failed".to_string()))?;
    Ok(u32::from_le_bytes(bytes))
}

impl Frame {
    fn new(message_type: MessageType, request_id: u64, payload: Vec<u8>) -> Result<Self, TallyError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TallyError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let mut header = FrameHeader::new(0, message_type, request_id, payload.len() as u64);
        if !payload.is_empty() {
            header.set_checksum(payload_checksum(&payload)?);
        }
        Ok(Self { header, payload })
    }

    /// Service greeting; request id 0.
    pub fn hello(hello: &Hello) -> Result<Self, TallyError> {
        Self::new(MessageType::Hello, 0, bincode::serialize(hello)?)
    }

    /// An arithmetic request for `task` under the given request id.
    pub fn request(request_id: u64, task: Task) -> Result<Self, TallyError> {
        let body = ExecuteRequest::from(task);
        Self::new(MessageType::Request, request_id, bincode::serialize(&body)?)
    }

    /// The service's answer to request `request_id`.
    pub fn response(request_id: u64, value: i64) -> Result<Self, TallyError> {
        let body = ExecuteReply { value };
        Self::new(MessageType::Response, request_id, bincode::serialize(&body)?)
    }

    /// Keep-alive frame; empty payload, reserved request id 0.
    pub fn heartbeat() -> Self {
        Self {
            header: FrameHeader::new(0, MessageType::Heartbeat, 0, 0),
            payload: Vec::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn message_type(&self) -> Result<MessageType, TallyError> {
        self.header.message_type()
    }

    pub fn request_id(&self) -> u64 {
        self.header.request_id()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    // ── Typed payload decoding ───────────────────────────────────

    pub fn decode_hello(&self) -> Result<Hello, TallyError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    pub fn decode_request(&self) -> Result<ExecuteRequest, TallyError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    pub fn decode_response(&self) -> Result<ExecuteReply, TallyError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    // ── Wire form ────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Result<Vec<u8>, TallyError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TallyError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let mut bytes = self.header.to_bytes().to_vec();
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TallyError> {
        if bytes.len() < HEADER_LEN {
            return Err(TallyError::InvalidHeader("frame shorter than header"));
        }
        let header_bytes = bytes[0..HEADER_LEN]
            .try_into()
            .map_err(|_| TallyError::InvalidHeader("frame shorter than header"))?;
        let header = FrameHeader::from_bytes(header_bytes)?;

        let expected = HEADER_LEN as u64 + header.payload_len();
        if (bytes.len() as u64) != expected {
            return Err(TallyError::InvalidHeader("frame length does not match header"));
        }
        if header.payload_len() > MAX_PAYLOAD_SIZE as u64 {
            return Err(TallyError::PayloadTooLarge {
                size: header.payload_len() as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            header,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Verify the payload against the header checksum.
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.payload.is_empty() {
            return Ok(());
        }
        if self.header.checksum() != payload_checksum(&self.payload)? {
            return Err(TallyError::ChecksumMismatch);
        }
        Ok(())
    }
}
