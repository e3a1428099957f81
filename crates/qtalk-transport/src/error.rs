use std::io;
use std::path::PathBuf;

/// Failures setting up a byte stream.
///
/// Once a stream exists, its reads and writes report plain `io::Error`s.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {}: {source}", .path.display())]
    Bind { path: PathBuf, source: io::Error },

    #[error("cannot connect to {}: {source}", .path.display())]
    Connect { path: PathBuf, source: io::Error },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

impl TransportError {
    /// The underlying I/O error.
    pub fn io(&self) -> &io::Error {
        match self {
            Self::Bind { source, .. } | Self::Connect { source, .. } | Self::Accept(source) => {
                source
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
