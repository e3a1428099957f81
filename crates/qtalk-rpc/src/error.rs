use qtalk_mux::MuxError;

/// Errors that can occur while making or answering RPC calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Channel or session failure underneath the call.
    #[error("mux error: {0}")]
    Mux(#[from] MuxError),

    /// A value could not be serialized or deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote handler answered with an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// A handler failed; the message is sent to the caller as-is.
    #[error("{0}")]
    Handler(String),

    /// A frame length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The channel ended after a length prefix but before the frame body.
    #[error("channel closed inside a {len}-byte frame")]
    TruncatedFrame { len: usize },

    /// The channel ended where a value was required.
    #[error("channel closed before {0}")]
    MissingValue(&'static str),

    /// The responder already sent its response.
    #[error("response already sent")]
    AlreadyResponded,
}

impl RpcError {
    /// Build a handler error carrying `message` to the caller.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
