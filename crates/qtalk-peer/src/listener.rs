use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use qtalk_transport::UdsListener;
use tracing::debug;

use crate::error::Result;
use crate::peer::{Peer, PeerConfig};

/// Listens for and accepts peer connections.
pub struct PeerListener {
    socket: UdsListener,
    peer_config: PeerConfig,
    next_peer_id: AtomicU64,
}

impl PeerListener {
    /// Bind to a Unix domain socket path. Must be called inside a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = UdsListener::bind(path)?;
        Ok(Self {
            socket,
            peer_config: PeerConfig::default(),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Override the configuration of accepted peers.
    pub fn with_peer_config(mut self, config: PeerConfig) -> Self {
        self.peer_config = config;
        self
    }

    /// Accept next connection and assign an auto-generated peer id.
    pub async fn accept(&self) -> Result<Peer> {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("peer-{id}")).await
    }

    /// Accept next connection and use explicit peer id.
    pub async fn accept_with_id(&self, peer_id: &str) -> Result<Peer> {
        let stream = self.socket.accept().await?;
        debug!(peer = peer_id, "peer connected");
        Ok(Peer::with_config(stream, self.peer_config).with_id(peer_id))
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

impl std::fmt::Debug for PeerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerListener")
            .field("path", &self.path())
            .finish()
    }
}
