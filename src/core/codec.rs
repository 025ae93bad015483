//! Tokio codec gluing the frame format to `Framed` transports.
//!
//! This decoder is the single frame extractor: partial frames wait for more
//! bytes, oversized declarations clear the buffer and fail the stream.
//! [`StreamReassembler`](crate::core::reassembler) wraps the same decoder for
//! callers that feed raw chunks by hand. The encoder writes a [`Frame`] whose
//! payload is already in its on-wire form (ciphertext for encrypted frames).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::core::frame::{self, Frame, ENCRYPTED_MARKER};
use crate::error::ProtocolError;

/// Codec for `Framed<T, FrameCodec>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        match frame::decode(src) {
            Ok((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(ProtocolError::InvalidHeader) if src.len() < frame::ENCRYPTED_HEADER_LEN => {
                Ok(None)
            }
            Err(ProtocolError::TruncatedFrame { .. }) => Ok(None),
            Err(e) => {
                warn!(buffered = src.len(), error = %e, "Dropping corrupt stream buffer");
                src.clear();
                Err(e)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if item.payload.len() > frame::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedFrame(item.payload.len()));
        }
        // A plaintext frame whose id collides with the marker would decode
        // as the start of an encrypted frame on the far side.
        if !item.encrypted && item.id == ENCRYPTED_MARKER {
            return Err(ProtocolError::ReservedPacketId(item.id));
        }

        dst.reserve(item.wire_len());
        if item.encrypted {
            dst.put_u8(ENCRYPTED_MARKER);
        }
        dst.put_u8(item.id);
        dst.put_u16_le(item.payload.len() as u16);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
