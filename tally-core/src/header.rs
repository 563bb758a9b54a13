//! Fixed-size frame header: magic, checksum, type, request id, length.
//!
//! Packed little-endian by hand so the layout is explicit and stable
//! across platforms.

use crate::error::TallyError;
use crate::message::MessageType;

/// Serialized header size in bytes.
pub const HEADER_LEN: usize = 28;

/// Raw header bytes as they travel on the wire.
pub type FrameHeaderBytes = [u8; HEADER_LEN];

const MAGIC: [u8; 4] = *b"TLY0";

/// The fixed-size header preceding every frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Truncated blake3 of the payload; 0 when the payload is empty.
    checksum: u32,
    message_type: u32,
    request_id: u64,
    payload_len: u64,
}

impl FrameHeader {
    pub fn new(checksum: u32, message_type: MessageType, request_id: u64, payload_len: u64) -> Self {
        Self {
            checksum,
            message_type: message_type as u32,
            request_id,
            payload_len,
        }
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn set_checksum(&mut self, checksum: u32) {
        self.checksum = checksum;
    }

    /// The frame kind, validated against the known set.
    pub fn message_type(&self) -> Result<MessageType, TallyError> {
        MessageType::try_from(self.message_type)
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    pub fn to_bytes(&self) -> FrameHeaderBytes {
        let mut bytes: FrameHeaderBytes = [0; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.message_type.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.request_id.to_le_bytes());
        bytes[20..28].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: FrameHeaderBytes) -> Result<Self, TallyError> {
        if bytes[0..4] != MAGIC {
            return Err(TallyError::InvalidMagic);
        }
        let u32_at = |at: usize| -> Result<u32, TallyError> {
            let slice: [u8; 4] = bytes[at..at + 4]
                .try_into()
                .map_err(|_| TallyError::InvalidHeader("truncated u32 field"))?;
            Ok(u32::from_le_bytes(slice))
        };
        let u64_at = |at: usize| -> Result<u64, TallyError> {
            let slice: [u8; 8] = bytes[at..at + 8]
                .try_into()
                .map_err(|_| TallyError::InvalidHeader("truncated u64 field"))?;
            Ok(u64::from_le_bytes(slice))
        };
        Ok(Self {
            checksum: u32_at(4)?,
            message_type: u32_at(8)?,
            request_id: u64_at(12)?,
            payload_len: u64_at(20)?,
        })
    }
}
