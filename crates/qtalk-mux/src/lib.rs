//! Flow-controlled channel multiplexing over a single byte stream.
//!
//! A [`Session`] owns one transport and runs many independent [`Channel`]s
//! over it. Every control message is framed as:
//! - a 1-byte kind (100..=106)
//! - big-endian `u32` fields fixed per kind
//! - for Data only, `length` payload bytes
//!
//! Each channel is credit-gated: a sender never transmits more than the
//! window the receiver granted, and the receiver returns credit as the
//! application reads.

pub mod channel;
pub mod codec;
pub mod error;
pub mod session;
mod table;

#[cfg(test)]
mod test_support;

pub use channel::Channel;
pub use codec::{
    decode_message, encode_message, Message, MessageCodec, DATA_HEADER_SIZE, MAX_PACKET_LENGTH,
    MIN_PACKET_LENGTH,
};
pub use error::{MuxError, Result};
pub use session::{Session, SessionConfig, DEFAULT_MAX_PACKET, DEFAULT_WINDOW_SIZE};
