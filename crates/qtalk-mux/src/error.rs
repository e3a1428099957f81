/// Errors that can occur while multiplexing channels over a session.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The message kind byte is outside the known set (100..=106).
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// The stream ended part-way through a message.
    #[error("truncated {kind} message ({len} bytes, need {need})")]
    Truncated {
        kind: &'static str,
        len: usize,
        need: usize,
    },

    /// A Data payload exceeds the allowed size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The remote sent more Data than the window it was granted.
    #[error("remote wrote {size} bytes with only {window} bytes of window")]
    WindowExceeded { size: u32, window: u32 },

    /// A WindowAdjust pushed the send window past the protocol maximum.
    #[error("invalid window adjust of {0} bytes")]
    InvalidWindowAdjust(u32),

    /// The remote refused to open the channel.
    #[error("channel open failed")]
    OpenFailed,

    /// The channel has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// A write was attempted after EOF was sent.
    #[error("write after eof")]
    WriteAfterEof,

    /// The session has been closed.
    #[error("session closed")]
    SessionClosed,

    /// An I/O error occurred on the underlying transport.
    #[error("mux I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MuxError>;
