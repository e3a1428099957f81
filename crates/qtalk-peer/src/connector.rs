use std::path::Path;

#[cfg(unix)]
use tracing::debug;

use crate::error::Result;
use crate::peer::{Peer, PeerConfig};

/// Connect to a listening peer over a Unix domain socket.
pub async fn connect(path: impl AsRef<Path>) -> Result<Peer> {
    connect_with_config(path, PeerConfig::default()).await
}

/// Connect with explicit configuration.
pub async fn connect_with_config(path: impl AsRef<Path>, config: PeerConfig) -> Result<Peer> {
    #[cfg(not(unix))]
    {
        let _ = config;
        let path = path.as_ref().to_path_buf();
        return Err(qtalk_transport::TransportError::Connect {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "qtalk-peer requires Unix domain sockets",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let path = path.as_ref();
        let stream = qtalk_transport::connect(path).await?;
        debug!(path = %path.display(), "connected");
        Ok(Peer::with_config(stream, config).with_id(path.display().to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::PeerError;
    use crate::listener::PeerListener;

    #[tokio::test]
    async fn connect_convenience() {
        let dir = std::env::temp_dir().join(format!(
            "qtalkc-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let sock_path = dir.join("listener.sock");

        let listener = PeerListener::bind(&sock_path).expect("listener should bind");
        let server = tokio::spawn(async move {
            let peer = listener.accept().await.expect("listener should accept");
            peer.handle(
                "echo",
                qtalk_rpc::unary(|args: serde_json::Value| async move {
                    Ok::<_, qtalk_rpc::RpcError>(args)
                }),
            );
            peer.respond().await;
        });

        let client = connect(&sock_path).await.expect("client should connect");
        let response = client
            .call::<_, serde_json::Value>("echo", &serde_json::json!({"hello": 1}))
            .await
            .expect("call should succeed");
        assert_eq!(response.value, serde_json::json!({"hello": 1}));

        client.close().await.expect("close should succeed");
        server.await.expect("server task should complete");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn connect_missing_socket_fails() {
        let path = std::env::temp_dir().join(format!("qtalkc-missing-{}.sock", std::process::id()));
        let err = connect(&path).await.expect_err("connect should fail");
        assert!(matches!(err, PeerError::Transport(_)));
    }
}
