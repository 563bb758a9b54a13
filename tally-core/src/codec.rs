//! `tokio_util` codec for framed TCP I/O.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TallyError;
use crate::frame::{Frame, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use crate::header::{FrameHeader, HEADER_LEN};

/// Stateless framing codec. Frames are self-describing: fixed header,
/// then `payload_len` bytes of payload.
#[derive(Debug, Default)]
pub struct TallyCodec;

impl Decoder for TallyCodec {
    type Item = Frame;
    type Error = TallyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header_bytes = src[..HEADER_LEN]
            .try_into()
            .map_err(|_| TallyError::InvalidHeader("short header read"))?;
        let header = FrameHeader::from_bytes(header_bytes)?;

        if header.payload_len() > MAX_PAYLOAD_SIZE as u64 {
            return Err(TallyError::PayloadTooLarge {
                size: header.payload_len() as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame_len = HEADER_LEN + header.payload_len() as usize;
        if frame_len > MAX_FRAME_SIZE {
            return Err(TallyError::FrameTooLarge {
                size: frame_len,
                max: MAX_FRAME_SIZE,
            });
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(frame_len);
        let frame = Frame::from_bytes(&bytes)?;
        frame.validate()?;
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for TallyCodec {
    type Error = TallyError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.to_bytes()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Operation, Task};

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = TallyCodec;
        let mut buf = BytesMut::new();

        let frame = Frame::request(3, Task::new(Operation::Subtract, 9, 4)).unwrap();
        codec.encode(frame.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut codec = TallyCodec;
        let mut buf = BytesMut::new();

        let frame = Frame::request(1, Task::new(Operation::Add, 1, 2)).unwrap();
        let bytes = frame.to_bytes().unwrap();

        // Feed all but the final byte: decoder must wait for more input.
        buf.extend_from_slice(&bytes[..bytes.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut codec = TallyCodec;
        let mut buf = BytesMut::new();

        for id in 1..=3u64 {
            let frame = Frame::response(id, id as i64).unwrap();
            codec.encode(frame, &mut buf).unwrap();
        }
        for id in 1..=3u64 {
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.request_id(), id);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn corrupted_payload_is_an_error() {
        let mut codec = TallyCodec;
        let mut buf = BytesMut::new();

        let frame = Frame::response(1, 42).unwrap();
        let mut bytes = frame.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        buf.extend_from_slice(&bytes);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TallyError::ChecksumMismatch)
        ));
    }

    #[test]
    fn oversized_length_is_an_error() {
        let mut codec = TallyCodec;
        let mut buf = BytesMut::new();

        let mut header = FrameHeader::new(0, crate::message::MessageType::Request, 1, 0).to_bytes();
        header[20..28].copy_from_slice(&(u64::MAX).to_le_bytes());
        buf.extend_from_slice(&header);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TallyError::PayloadTooLarge { .. })
        ));
    }
}
