use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Buffer size of each direction of an in-memory [`pipe`].
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Anything a session can run over.
///
/// The stream must be reliable, ordered and non-duplicating. Closing the
/// transport is `AsyncWriteExt::shutdown` on the write side.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected byte stream implementing `AsyncRead + AsyncWrite`.
///
/// This is the concrete transport type handed out by [`pipe`] and by
/// [`UdsListener`](crate::UdsListener).
pub struct TransportStream {
    inner: TransportStreamInner,
}

enum TransportStreamInner {
    Memory(DuplexStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

/// Create a connected pair of in-memory streams.
///
/// Bytes written to one end are read from the other. Dropping or shutting
/// down one end makes reads on the other end return EOF.
pub fn pipe() -> (TransportStream, TransportStream) {
    pipe_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Create a connected pair of in-memory streams with an explicit per-direction buffer.
pub fn pipe_with_capacity(capacity: usize) -> (TransportStream, TransportStream) {
    let (left, right) = tokio::io::duplex(capacity);
    (
        TransportStream {
            inner: TransportStreamInner::Memory(left),
        },
        TransportStream {
            inner: TransportStreamInner::Memory(right),
        },
    )
}

impl TransportStream {
    /// Create a stream from a connected Unix domain socket.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: TransportStreamInner::Unix(stream),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            TransportStreamInner::Memory(_) => "memory",
            #[cfg(unix)]
            TransportStreamInner::Unix(_) => "unix-domain-socket",
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `(uid, gid, pid)`, or `None` for in-memory pipes and on
    /// platforms that do not expose peer credentials.
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<i32>)> {
        match &self.inner {
            TransportStreamInner::Memory(_) => None,
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => stream
                .peer_cred()
                .ok()
                .map(|cred| (cred.uid(), cred.gid(), cred.pid())),
        }
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            TransportStreamInner::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            TransportStreamInner::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            TransportStreamInner::Memory(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            TransportStreamInner::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            TransportStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn pipe_carries_bytes_both_ways() {
        let (mut left, mut right) = pipe();

        left.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        right.write_all(b"pong").await.unwrap();
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn shutdown_reads_as_eof_on_other_end() {
        let (mut left, mut right) = pipe();
        left.shutdown().await.unwrap();

        let mut buf = [0u8; 8];
        let n = right.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn memory_stream_reports_no_credentials() {
        let (left, _right) = pipe_with_capacity(16);
        assert_eq!(left.transport_name(), "memory");
        assert!(left.peer_credentials().is_none());
    }
}
