//! Unix domain sockets: a listener that owns its socket file, and `connect`.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::TransportStream;

/// Mode applied to socket files created by [`UdsListener::bind`].
pub const SOCKET_MODE: u32 = 0o600;

/// Identifies one socket file so cleanup never removes a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketFile {
    dev: u64,
    ino: u64,
}

impl SocketFile {
    fn at(path: &Path) -> Option<Self> {
        let meta = fs::symlink_metadata(path).ok()?;
        meta.file_type().is_socket().then(|| Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

/// A listening Unix domain socket.
///
/// The socket file is created with [`SOCKET_MODE`] and removed again when the
/// listener is dropped, as long as it is still the file this listener made.
pub struct UdsListener {
    inner: UnixListener,
    path: PathBuf,
    file: Option<SocketFile>,
}

impl UdsListener {
    /// Listen on `path`. Must be called inside a tokio runtime.
    ///
    /// A leftover socket file nobody is listening on is replaced. A live
    /// socket or any other kind of file at `path` is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_failed = |source: io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        clear_stale_socket(&path).map_err(bind_failed)?;
        let inner = UnixListener::bind(&path).map_err(bind_failed)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(bind_failed)?;
        let file = SocketFile::at(&path);

        info!(path = %path.display(), "listening");
        Ok(Self { inner, path, file })
    }

    pub async fn accept(&self) -> Result<TransportStream> {
        let (stream, _) = self.inner.accept().await.map_err(TransportError::Accept)?;
        debug!(path = %self.path.display(), "accepted connection");
        Ok(TransportStream::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        if self.file.is_some() && SocketFile::at(&self.path) == self.file {
            debug!(path = %self.path.display(), "removing socket file");
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl std::fmt::Debug for UdsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsListener")
            .field("path", &self.path)
            .finish()
    }
}

/// Connect to the socket listening at `path`.
pub async fn connect(path: impl AsRef<Path>) -> Result<TransportStream> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(TransportStream::from_unix(stream))
}

fn clear_stale_socket(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if !meta.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ));
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            "another process is listening on this socket",
        ));
    }
    debug!(path = %path.display(), "replacing stale socket");
    fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qtalk-uds-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn connect_reaches_listener_and_drop_removes_file() {
        let dir = scratch("roundtrip");
        let path = dir.join("s.sock");
        let listener = UdsListener::bind(&path).unwrap();

        let client = tokio::spawn({
            let path = path.clone();
            async move {
                let mut stream = connect(&path).await.unwrap();
                stream.write_all(b"hi").await.unwrap();
            }
        });
        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        client.await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SOCKET_MODE);

        drop(listener);
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = scratch("stale");
        let path = dir.join("s.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = UdsListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn live_socket_is_not_taken_over() {
        let dir = scratch("live");
        let path = dir.join("s.sock");
        let _first = UdsListener::bind(&path).unwrap();

        let err = UdsListener::bind(&path).unwrap_err();
        match err {
            TransportError::Bind { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse)
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn regular_file_is_left_alone() {
        let dir = scratch("file");
        let path = dir.join("s.sock");
        fs::write(&path, b"data").unwrap();

        assert!(matches!(
            UdsListener::bind(&path),
            Err(TransportError::Bind { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), b"data");
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn replaced_file_survives_drop() {
        let dir = scratch("replaced");
        let path = dir.join("s.sock");
        let listener = UdsListener::bind(&path).unwrap();
        fs::remove_file(&path).unwrap();
        fs::write(&path, b"other").unwrap();

        drop(listener);
        assert_eq!(fs::read(&path).unwrap(), b"other");
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn connect_to_missing_path_fails() {
        let dir = scratch("missing");
        let err = connect(dir.join("nobody.sock")).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
