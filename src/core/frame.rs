//! One length-prefixed unit of the wire protocol, plaintext or encrypted.

use crate::crypto::Envelope;
use crate::error::{ProtocolError, Result};

/// Upper bound on one whole frame as transmitted, header included.
///
/// A declared length that would push a frame past this bound is treated as a
/// lying peer and resets the reassembly buffer.
pub const MAX_PACKET_SIZE: usize = 10_240;

/// Largest payload (or ciphertext) a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - ENCRYPTED_HEADER_LEN;

/// First wire byte of an encrypted frame. Never assignable as a packet id.
pub const ENCRYPTED_MARKER: u8 = 0x01;

/// Plaintext header: id(1) + length(2).
pub const PLAIN_HEADER_LEN: usize = 3;

/// Encrypted header: marker(1) + id(1) + length(2).
pub const ENCRYPTED_HEADER_LEN: usize = 4;

/// Server-initiated goodbye. Payload is a u32 LE timeout in seconds.
pub const ID_SERVER_GOODBYE: u8 = 0xFE;

/// Client-initiated goodbye. Payload is a u32 LE timeout in seconds.
pub const ID_CLIENT_GOODBYE: u8 = 0xFF;

/// Ids application protocols may never register handlers for.
pub const RESERVED_IDS: [u8; 3] = [ENCRYPTED_MARKER, ID_SERVER_GOODBYE, ID_CLIENT_GOODBYE];

/// A decoded frame.
///
/// For `encrypted` frames the payload is still ciphertext; call
/// [`Frame::decrypt`] with the session envelope before handing it to
/// application logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u8,
    pub payload: Vec<u8>,
    pub encrypted: bool,
}

impl Frame {
    /// Encrypt a plaintext payload into an encrypted frame.
    ///
    /// Both length bounds apply: the plaintext must fit a frame before
    /// padding, and the ciphertext must still fit after it.
    pub fn seal(id: u8, payload: &[u8], envelope: &dyn Envelope) -> Result<Frame> {
        check_payload_len(payload.len())?;
        let ciphertext = envelope.encrypt(payload)?;
        check_payload_len(ciphertext.len())?;
        Ok(Frame {
            id,
            payload: ciphertext,
            encrypted: true,
        })
    }

    /// Serialized size of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        let header = if self.encrypted {
            ENCRYPTED_HEADER_LEN
        } else {
            PLAIN_HEADER_LEN
        };
        header + self.payload.len()
    }

    /// Decrypt an encrypted frame into its plaintext form.
    ///
    /// # Errors
    /// [`ProtocolError::DecryptionFailure`] on bad padding or corrupt
    /// ciphertext. Callers treat this as connection-fatal.
    pub fn decrypt(self, envelope: &dyn Envelope) -> Result<Frame> {
        if !self.encrypted {
            return Ok(self);
        }
        let plaintext = envelope.decrypt(&self.payload)?;
        Ok(Frame {
            id: self.id,
            payload: plaintext,
            encrypted: false,
        })
    }
}

/// Encode a plaintext frame: `[id][length LE][payload]`.
///
/// # Errors
/// [`ProtocolError::ReservedPacketId`] when `id` is the encrypted marker,
/// and [`ProtocolError::OversizedFrame`] when the payload exceeds
/// [`MAX_PAYLOAD_SIZE`]. There is no fragmentation layer above frames;
/// oversized payloads are an unsupported case and rejected outright.
pub fn encode(id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if id == ENCRYPTED_MARKER {
        return Err(ProtocolError::ReservedPacketId(id));
    }
    check_payload_len(payload.len())?;

    let mut buf = Vec::with_capacity(PLAIN_HEADER_LEN + payload.len());
    buf.push(id);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encrypt a payload through the session envelope and encode it:
/// `[marker][id][length LE][ciphertext]`. `length` is the ciphertext length.
pub fn encode_encrypted(id: u8, payload: &[u8], envelope: &dyn Envelope) -> Result<Vec<u8>> {
    let frame = Frame::seal(id, payload, envelope)?;

    let mut buf = Vec::with_capacity(frame.wire_len());
    buf.push(ENCRYPTED_MARKER);
    buf.push(frame.id);
    buf.extend_from_slice(&(frame.payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(&frame.payload);
    Ok(buf)
}

/// Decode one frame from the front of `bytes`.
///
/// Returns the frame and the number of bytes it consumed. Encrypted frames are
/// returned with their ciphertext intact.
///
/// # Errors
/// - [`ProtocolError::InvalidHeader`] if fewer than a header's worth of bytes
///   are available.
/// - [`ProtocolError::TruncatedFrame`] if fewer than `length` payload bytes
///   follow the header.
/// - [`ProtocolError::OversizedFrame`] if the declared length exceeds the
///   frame bound.
pub fn decode(bytes: &[u8]) -> Result<(Frame, usize)> {
    let encrypted = matches!(bytes.first(), Some(&ENCRYPTED_MARKER));
    let header_len = if encrypted {
        ENCRYPTED_HEADER_LEN
    } else {
        PLAIN_HEADER_LEN
    };

    if bytes.len() < header_len {
        return Err(ProtocolError::InvalidHeader);
    }

    let (id, len_offset) = if encrypted {
        (bytes[1], 2)
    } else {
        (bytes[0], 1)
    };
    let declared = u16::from_le_bytes([bytes[len_offset], bytes[len_offset + 1]]) as usize;

    if header_len + declared > MAX_PACKET_SIZE {
        return Err(ProtocolError::OversizedFrame(header_len + declared));
    }
    if bytes.len() < header_len + declared {
        return Err(ProtocolError::TruncatedFrame {
            declared,
            available: bytes.len() - header_len,
        });
    }

    let payload = bytes[header_len..header_len + declared].to_vec();
    Ok((
        Frame {
            id,
            payload,
            encrypted,
        },
        header_len + declared,
    ))
}

/// Build a goodbye frame carrying the announced timeout.
pub fn encode_goodbye(id: u8, timeout_secs: u32) -> Result<Vec<u8>> {
    encode(id, &timeout_secs.to_le_bytes())
}

/// Read the timeout out of a goodbye frame payload.
pub fn decode_goodbye_timeout(payload: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| ProtocolError::InvalidHeader)?;
    Ok(u32::from_le_bytes(bytes))
}

fn check_payload_len(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedFrame(len));
    }
    Ok(())
}
