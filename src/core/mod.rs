//! # Core Wire Format
//!
//! Frame layout, incremental stream reassembly, and the tokio codec.
//!
//! ## Wire Format
//! ```text
//! Plaintext:  [Id(1)] [Length(2, LE)] [Payload(N)]
//! Encrypted:  [Marker(1)=0x01] [Id(1)] [Length(2, LE)] [Ciphertext(N)]
//! ```
//!
//! `Length` is always the transmitted byte count: for encrypted frames it is
//! the ciphertext length, padding included.
//!
//! ## Security
//! - Maximum frame size: [`frame::MAX_PACKET_SIZE`] bytes. A peer announcing a
//!   larger length gets its reassembly buffer dropped rather than honored.
//! - Ids `0xFE`/`0xFF` are reserved goodbye signals; `0x01` is reserved as the
//!   encrypted-frame marker so decoding stays self-describing.

pub mod codec;
pub mod frame;
pub mod reassembler;
