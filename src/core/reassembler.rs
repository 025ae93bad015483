//! Incremental frame extraction from an unreliable byte stream.
//!
//! The transport delivers bytes in whatever chunks it pleases: a header split
//! across two reads, a payload trickling in byte by byte, or several complete
//! frames coalesced into one read. The reassembler buffers raw chunks per
//! connection and emits complete frames in arrival order.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::core::codec::FrameCodec;
use crate::core::frame::{Frame, MAX_PACKET_SIZE};
use crate::error::Result;

/// Per-connection reassembly buffer.
///
/// The buffer is bounded by [`MAX_PACKET_SIZE`]: a peer declaring a frame
/// length beyond the bound gets the whole buffer dropped instead of letting it
/// grow on their say-so.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: BytesMut,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Append a raw chunk and extract every frame it completes, in order.
    ///
    /// Extraction delegates to [`FrameCodec`], so both entry points share one
    /// parser. An oversized declared length resets the buffer and returns
    /// [`ProtocolError::OversizedFrame`](crate::error::ProtocolError::OversizedFrame);
    /// any frames extracted earlier in the same call are discarded with it,
    /// since the stream is corrupt from that point and the connection is
    /// going away.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);

        let mut codec = FrameCodec;
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes currently waiting for more data.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial state, e.g. on connection teardown.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
