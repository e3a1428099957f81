use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{MuxError, Result};

/// Message kind codes.
pub const MSG_OPEN: u8 = 100;
pub const MSG_OPEN_CONFIRM: u8 = 101;
pub const MSG_OPEN_FAILURE: u8 = 102;
pub const MSG_WINDOW_ADJUST: u8 = 103;
pub const MSG_DATA: u8 = 104;
pub const MSG_EOF: u8 = 105;
pub const MSG_CLOSE: u8 = 106;

/// Data header: kind (1) + channel (4) + length (4) = 9 bytes.
pub const DATA_HEADER_SIZE: usize = 9;

/// Smallest max-packet-size a peer may declare when opening a channel.
pub const MIN_PACKET_LENGTH: u32 = 9;

/// Largest max-packet-size a peer may declare, and the hard cap on any
/// single Data payload accepted off the wire.
pub const MAX_PACKET_LENGTH: u32 = 1 << 31;

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Open {
        sender_id: u32,
        window_size: u32,
        max_packet_size: u32,
    },
    OpenConfirm {
        channel_id: u32,
        sender_id: u32,
        window_size: u32,
        max_packet_size: u32,
    },
    OpenFailure {
        channel_id: u32,
    },
    WindowAdjust {
        channel_id: u32,
        additional_bytes: u32,
    },
    Data {
        channel_id: u32,
        data: Bytes,
    },
    Eof {
        channel_id: u32,
    },
    Close {
        channel_id: u32,
    },
}

impl Message {
    /// The wire kind code.
    pub fn kind(&self) -> u8 {
        match self {
            Message::Open { .. } => MSG_OPEN,
            Message::OpenConfirm { .. } => MSG_OPEN_CONFIRM,
            Message::OpenFailure { .. } => MSG_OPEN_FAILURE,
            Message::WindowAdjust { .. } => MSG_WINDOW_ADJUST,
            Message::Data { .. } => MSG_DATA,
            Message::Eof { .. } => MSG_EOF,
            Message::Close { .. } => MSG_CLOSE,
        }
    }

    /// The channel this message is addressed to. `Open` is addressed to the session.
    pub fn channel_id(&self) -> Option<u32> {
        match self {
            Message::Open { .. } => None,
            Message::OpenConfirm { channel_id, .. }
            | Message::OpenFailure { channel_id }
            | Message::WindowAdjust { channel_id, .. }
            | Message::Data { channel_id, .. }
            | Message::Eof { channel_id }
            | Message::Close { channel_id } => Some(*channel_id),
        }
    }

    /// The total wire size of this message.
    pub fn wire_size(&self) -> usize {
        match self {
            Message::Data { data, .. } => DATA_HEADER_SIZE + data.len(),
            other => fixed_size(other.kind()).unwrap_or(0),
        }
    }
}

/// Returns a human-readable name for a message kind.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        MSG_OPEN => "open",
        MSG_OPEN_CONFIRM => "open-confirm",
        MSG_OPEN_FAILURE => "open-failure",
        MSG_WINDOW_ADJUST => "window-adjust",
        MSG_DATA => "data",
        MSG_EOF => "eof",
        MSG_CLOSE => "close",
        _ => "unknown",
    }
}

/// Size of the fixed part of a message, including the kind byte.
fn fixed_size(kind: u8) -> Option<usize> {
    match kind {
        MSG_OPEN => Some(13),
        MSG_OPEN_CONFIRM => Some(17),
        MSG_OPEN_FAILURE | MSG_EOF | MSG_CLOSE => Some(5),
        MSG_WINDOW_ADJUST | MSG_DATA => Some(9),
        _ => None,
    }
}

/// Encode a message into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────┬──────────────────────────────┬──────────────────┐
/// │ Kind (1B)│ Fixed fields (u32 each)      │ Data payload     │
/// │ 100..106 │ see Message variants         │ (Data only)      │
/// └──────────┴──────────────────────────────┴──────────────────┘
/// ```
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    dst.reserve(msg.wire_size());
    dst.put_u8(msg.kind());
    match msg {
        Message::Open {
            sender_id,
            window_size,
            max_packet_size,
        } => {
            dst.put_u32(*sender_id);
            dst.put_u32(*window_size);
            dst.put_u32(*max_packet_size);
        }
        Message::OpenConfirm {
            channel_id,
            sender_id,
            window_size,
            max_packet_size,
        } => {
            dst.put_u32(*channel_id);
            dst.put_u32(*sender_id);
            dst.put_u32(*window_size);
            dst.put_u32(*max_packet_size);
        }
        Message::WindowAdjust {
            channel_id,
            additional_bytes,
        } => {
            dst.put_u32(*channel_id);
            dst.put_u32(*additional_bytes);
        }
        Message::Data { channel_id, data } => {
            if data.len() > MAX_PACKET_LENGTH as usize {
                return Err(MuxError::PayloadTooLarge {
                    size: data.len(),
                    max: MAX_PACKET_LENGTH as usize,
                });
            }
            dst.put_u32(*channel_id);
            dst.put_u32(data.len() as u32);
            dst.put_slice(data);
        }
        Message::OpenFailure { channel_id }
        | Message::Eof { channel_id }
        | Message::Close { channel_id } => {
            dst.put_u32(*channel_id);
        }
    }
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer. Data payloads
/// larger than `max_payload` are rejected before they are buffered.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    let Some(&kind) = src.first() else {
        return Ok(None);
    };
    let fixed = fixed_size(kind).ok_or(MuxError::UnknownKind(kind))?;
    if src.len() < fixed {
        return Ok(None);
    }

    if kind == MSG_DATA {
        let len = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if len > max_payload {
            return Err(MuxError::PayloadTooLarge {
                size: len,
                max: max_payload,
            });
        }
        if src.len() < DATA_HEADER_SIZE + len {
            return Ok(None);
        }
        src.advance(1);
        let channel_id = src.get_u32();
        src.advance(4);
        let data = src.split_to(len).freeze();
        return Ok(Some(Message::Data { channel_id, data }));
    }

    src.advance(1);
    let msg = match kind {
        MSG_OPEN => Message::Open {
            sender_id: src.get_u32(),
            window_size: src.get_u32(),
            max_packet_size: src.get_u32(),
        },
        MSG_OPEN_CONFIRM => Message::OpenConfirm {
            channel_id: src.get_u32(),
            sender_id: src.get_u32(),
            window_size: src.get_u32(),
            max_packet_size: src.get_u32(),
        },
        MSG_OPEN_FAILURE => Message::OpenFailure {
            channel_id: src.get_u32(),
        },
        MSG_WINDOW_ADJUST => Message::WindowAdjust {
            channel_id: src.get_u32(),
            additional_bytes: src.get_u32(),
        },
        MSG_EOF => Message::Eof {
            channel_id: src.get_u32(),
        },
        MSG_CLOSE => Message::Close {
            channel_id: src.get_u32(),
        },
        other => return Err(MuxError::UnknownKind(other)),
    };
    Ok(Some(msg))
}

/// `tokio_util` codec for control messages.
///
/// Used with `FramedRead`/`FramedWrite` by the session so partial transport
/// reads are buffered until a whole message is available.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload: usize,
}

impl MessageCodec {
    /// Create a codec that accepts Data payloads up to `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_PACKET_LENGTH as usize)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = MuxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        decode_message(src, self.max_payload)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let kind = src[0];
        let need = if kind == MSG_DATA && src.len() >= DATA_HEADER_SIZE {
            DATA_HEADER_SIZE + u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize
        } else {
            fixed_size(kind).unwrap_or(0)
        };
        Err(MuxError::Truncated {
            kind: kind_name(kind),
            len: src.len(),
            need,
        })
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = MuxError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        encode_message(&msg, dst)
    }
}
