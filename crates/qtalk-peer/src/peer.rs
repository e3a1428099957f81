use std::sync::Arc;

use qtalk_mux::{Session, SessionConfig};
use qtalk_rpc::{
    respond, Client, Codec, FrameCodec, FrameConfig, Handler, JsonCodec, RespondMux, Response,
};
use qtalk_transport::{pipe, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Peer configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerConfig {
    /// Channel window and packet limits announced to the other side.
    pub session: SessionConfig,
    /// Frame size limit for call headers and values.
    pub frame: FrameConfig,
}

/// One end of a connection that both makes and serves calls.
///
/// Handlers registered with [`handle`](Self::handle) only run while
/// [`respond`](Self::respond) is being driven. Cloning yields another handle
/// to the same peer.
pub struct Peer<C: Codec = JsonCodec> {
    id: String,
    session: Session,
    client: Client<C>,
    mux: Arc<RespondMux<C>>,
}

impl<C: Codec> Clone for Peer<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            session: self.session.clone(),
            client: self.client.clone(),
            mux: Arc::clone(&self.mux),
        }
    }
}

impl Peer<JsonCodec> {
    /// Start a JSON peer over `transport` with default limits.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(transport, PeerConfig::default())
    }

    pub fn with_config(transport: impl Transport, config: PeerConfig) -> Self {
        Self::with_codec(transport, JsonCodec, config)
    }

    /// Two connected peers over an in-memory pipe.
    pub fn pair() -> (Self, Self) {
        let (left, right) = pipe();
        (
            Self::new(left).with_id("left"),
            Self::new(right).with_id("right"),
        )
    }
}

impl<C: Codec> Peer<C> {
    /// Start a peer with an explicit value codec.
    pub fn with_codec(transport: impl Transport, codec: C, config: PeerConfig) -> Self {
        let session = Session::with_config(transport, config.session);
        let client = Client::new(session.clone(), FrameCodec::with_config(codec, config.frame));
        Self {
            id: "peer".to_string(),
            session,
            client,
            mux: Arc::new(RespondMux::new()),
        }
    }

    /// Rename the peer; the id only appears in logs.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client(&self) -> &Client<C> {
        &self.client
    }

    pub fn mux(&self) -> &Arc<RespondMux<C>> {
        &self.mux
    }

    /// Register a handler for calls from the other side.
    pub fn handle(&self, pattern: &str, handler: impl Handler<C>) {
        self.mux.handle(pattern, handler);
    }

    pub fn remove(&self, pattern: &str) -> bool {
        self.mux.remove(pattern).is_some()
    }

    /// Call `selector` on the other side.
    pub async fn call<A, R>(&self, selector: &str, args: &A) -> Result<Response<R, C>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        Ok(self.client.call(selector, args).await?)
    }

    /// Serve inbound calls until the session closes.
    ///
    /// Each call runs in its own task, so calls on different channels
    /// complete in no particular order.
    pub async fn respond(&self) {
        debug!(peer = %self.id, "responding");
        while let Some(channel) = self.session.accept().await {
            let mux = Arc::clone(&self.mux);
            let client = self.client.clone();
            let peer = self.id.clone();
            tokio::spawn(async move {
                let id = channel.id();
                if let Err(err) = respond(&*mux as &dyn Handler<C>, channel, client).await {
                    warn!(peer = %peer, channel = id, error = %err, "respond failed");
                }
            });
        }
        debug!(peer = %self.id, "session closed; respond loop done");
    }

    /// Run [`respond`](Self::respond) on a background task.
    pub fn spawn_respond(&self) -> JoinHandle<()> {
        let peer = self.clone();
        tokio::spawn(async move { peer.respond().await })
    }

    /// Close the session, ending every channel and the respond loop.
    pub async fn close(&self) -> Result<()> {
        debug!(peer = %self.id, "closing peer");
        Ok(self.session.close().await?)
    }

    /// Wait for the session to end.
    pub async fn wait(&self) -> Result<()> {
        Ok(self.session.wait().await?)
    }
}

impl<C: Codec> std::fmt::Debug for Peer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("session", &self.session)
            .field("handlers", &self.mux.len())
            .finish()
    }
}
