//! Length-prefixed values over a channel.
//!
//! ```text
//! ┌──────────────┬───────────────────────────┐
//! │ Length (4B)  │ Body (Length bytes)        │
//! │ big-endian   │ one codec-encoded value    │
//! └──────────────┴───────────────────────────┘
//! ```

use bytes::{BufMut, BytesMut};
use qtalk_mux::Channel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, RpcError};

/// Frame length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame body: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest frame body accepted or produced. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Writes and reads whole codec values on a channel.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec<C = JsonCodec> {
    codec: C,
    config: FrameConfig,
}

impl<C: Codec> FrameCodec<C> {
    pub fn new(codec: C) -> Self {
        Self::with_config(codec, FrameConfig::default())
    }

    pub fn with_config(codec: C, config: FrameConfig) -> Self {
        Self { codec, config }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> FrameConfig {
        self.config
    }

    /// Encode `value` and write it as one frame.
    pub async fn encode<T: Serialize + ?Sized>(&self, channel: &Channel, value: &T) -> Result<()> {
        let body = self.codec.encode(value)?;
        let max = self.config.max_frame_size.min(u32::MAX as usize);
        if body.len() > max {
            return Err(RpcError::FrameTooLarge {
                size: body.len(),
                max,
            });
        }

        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);
        trace!(channel = channel.id(), len = body.len(), "write frame");
        channel.write(&frame).await?;
        Ok(())
    }

    /// Read one frame and decode it.
    ///
    /// Returns `Ok(None)` on a clean end of stream before the length prefix.
    /// A stream that ends anywhere inside a frame is an error.
    pub async fn decode<T: DeserializeOwned>(&self, channel: &Channel) -> Result<Option<T>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        if !channel.read_exact(&mut prefix).await? {
            return Ok(None);
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.config.max_frame_size {
            return Err(RpcError::FrameTooLarge {
                size: len,
                max: self.config.max_frame_size,
            });
        }

        let mut body = vec![0u8; len];
        if !channel.read_exact(&mut body).await? && len > 0 {
            return Err(RpcError::TruncatedFrame { len });
        }
        trace!(channel = channel.id(), len, "read frame");
        self.codec.decode(&body).map(Some)
    }
}
