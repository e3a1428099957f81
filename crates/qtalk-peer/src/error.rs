/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] qtalk_transport::TransportError),

    /// Session or channel error.
    #[error("mux error: {0}")]
    Mux(#[from] qtalk_mux::MuxError),

    /// Call failed, including errors reported by the remote handler.
    #[error("rpc error: {0}")]
    Rpc(#[from] qtalk_rpc::RpcError),
}

impl PeerError {
    /// The remote handler's message, if this is an in-band call error.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Rpc(qtalk_rpc::RpcError::Remote(message)) => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
