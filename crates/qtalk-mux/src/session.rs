//! Session: owns the transport, the channel table and the dispatch loop.
//!
//! ```text
//!   transport ──read──▶ dispatch loop ──▶ Open?  ──▶ handle_open ──▶ accept()
//!                           │
//!                           └────────▶ channel[id].handle(msg)
//!
//!   Channel::write / read / close ──▶ Shared::send ──write──▶ transport
//! ```
//!
//! Only the dispatch loop reads from the transport, so messages are applied
//! strictly one at a time in arrival order. Writers share the transport
//! through one async mutex around the framed sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use qtalk_transport::Transport;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::codec::{kind_name, Message, MessageCodec, MAX_PACKET_LENGTH, MIN_PACKET_LENGTH};
use crate::error::{MuxError, Result};
use crate::table::ChannelTable;

/// Default largest Data payload: 16 MiB.
pub const DEFAULT_MAX_PACKET: u32 = 1 << 24;

/// Default per-channel receive window: 64 maximum-size packets.
pub const DEFAULT_WINDOW_SIZE: u32 = 64 * DEFAULT_MAX_PACKET;

type BoxedTransport = Box<dyn Transport>;
type MessageSink = FramedWrite<WriteHalf<BoxedTransport>, MessageCodec>;
type MessageStream = FramedRead<ReadHalf<BoxedTransport>, MessageCodec>;

/// Channel parameters this side announces on Open and OpenConfirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Receive window granted to the peer for each channel.
    pub window_size: u32,
    /// Largest Data payload this side accepts per message.
    pub max_packet_size: u32,
}

impl SessionConfig {
    /// Largest Data message the session decoder will buffer.
    ///
    /// A channel never grants more than `window_size`, so anything longer
    /// than both limits cannot belong to a well-behaved channel and ends the
    /// session. Smaller violations are handled by the addressed channel.
    pub fn max_buffered_data(&self) -> usize {
        self.window_size.max(self.max_packet_size) as usize
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET,
        }
    }
}

/// State shared by the session handle, its channels and the dispatch loop.
pub(crate) struct Shared {
    config: SessionConfig,
    sink: tokio::sync::Mutex<MessageSink>,
    channels: Mutex<ChannelTable<Channel>>,
    closed: AtomicBool,
    transport_closed: AtomicBool,
}

impl Shared {
    pub(crate) async fn send(&self, msg: Message) -> Result<()> {
        trace!(kind = kind_name(msg.kind()), channel = ?msg.channel_id(), "send");
        let mut sink = self.sink.lock().await;
        sink.send(msg).await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn table(&self) -> MutexGuard<'_, ChannelTable<Channel>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn new_channel(
        self: &Arc<Self>,
        ready: Option<oneshot::Sender<bool>>,
    ) -> Channel {
        let weak = Arc::downgrade(self);
        self.table()
            .insert_with(|id| Channel::new(id, weak, &self.config, ready))
            .clone()
    }

    fn channel(&self, id: u32) -> Option<Channel> {
        self.table().get(id).cloned()
    }

    pub(crate) fn remove_channel(&self, channel: &Channel) {
        self.table()
            .remove_if(channel.id(), |live| live.ptr_eq(channel));
    }

    /// Shut down every live channel and close the transport. Idempotent.
    async fn teardown(&self) {
        self.closed.store(true, Ordering::Release);
        let live = self.table().drain();
        if !live.is_empty() {
            debug!(channels = live.len(), "shutting down live channels");
        }
        for channel in live {
            channel.shutdown();
        }
        if !self.transport_closed.swap(true, Ordering::AcqRel) {
            let mut sink = self.sink.lock().await;
            if let Err(err) = sink.close().await {
                debug!(error = %err, "transport close failed");
            }
        }
    }
}

/// A multiplexing session over one transport.
///
/// Cloning yields another handle to the same session. Creating a session
/// spawns its dispatch loop, so it must happen inside a tokio runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    shared: Arc<Shared>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Channel>>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Session {
    /// Start a session with default channel parameters.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Start a session with explicit channel parameters.
    pub fn with_config(transport: impl Transport, config: SessionConfig) -> Self {
        let boxed: BoxedTransport = Box::new(transport);
        let (read_half, write_half) = tokio::io::split(boxed);

        let shared = Arc::new(Shared {
            config,
            sink: tokio::sync::Mutex::new(FramedWrite::new(write_half, MessageCodec::default())),
            channels: Mutex::new(ChannelTable::new()),
            closed: AtomicBool::new(false),
            transport_closed: AtomicBool::new(false),
        });
        let stream = FramedRead::new(read_half, MessageCodec::new(config.max_buffered_data()));
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(dispatch(
            Arc::clone(&shared),
            stream,
            incoming_tx,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(SessionInner {
                shared,
                incoming: tokio::sync::Mutex::new(incoming_rx),
                cancel,
                task: tokio::sync::Mutex::new(Some(task)),
            }),
        }
    }

    /// Channel parameters announced by this side.
    pub fn config(&self) -> SessionConfig {
        self.inner.shared.config
    }

    /// Returns true once the session has started tearing down.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.is_closed()
    }

    /// Number of channels currently in the table.
    pub fn channel_count(&self) -> usize {
        self.inner.shared.table().len()
    }

    /// Open a new channel and wait for the peer to confirm it.
    ///
    /// There is no timeout: if the peer never answers, this never resolves.
    /// Dropping the future after the Open was sent leaves the slot reserved
    /// until the peer answers; a late confirmation is closed straight away.
    pub async fn open(&self) -> Result<Channel> {
        let shared = &self.inner.shared;
        if shared.is_closed() {
            return Err(MuxError::SessionClosed);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let channel = shared.new_channel(Some(ready_tx));
        let open = Message::Open {
            sender_id: channel.id(),
            window_size: shared.config.window_size,
            max_packet_size: shared.config.max_packet_size,
        };
        if let Err(err) = shared.send(open).await {
            channel.shutdown();
            return Err(err);
        }

        match ready_rx.await {
            Ok(true) => {
                debug!(
                    channel = channel.id(),
                    remote_id = channel.remote_id(),
                    "channel opened"
                );
                Ok(channel)
            }
            _ if shared.is_closed() => Err(MuxError::SessionClosed),
            _ => Err(MuxError::OpenFailed),
        }
    }

    /// Wait for the next channel opened by the peer.
    ///
    /// Returns `None` once the session has closed.
    pub async fn accept(&self) -> Option<Channel> {
        let mut incoming = self.inner.incoming.lock().await;
        incoming.recv().await
    }

    /// Shut down every channel, close the transport and wait for the dispatch
    /// loop to finish.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("closing session");
        }
        self.inner.cancel.cancel();
        self.inner.shared.teardown().await;
        self.wait().await
    }

    /// Wait for the dispatch loop to end.
    ///
    /// The first caller observes the error that ended the loop, if any.
    pub async fn wait(&self) -> Result<()> {
        let task = self.inner.task.lock().await.take();
        match task {
            Some(task) => task
                .await
                .map_err(|err| MuxError::Io(std::io::Error::other(err)))?,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.shared.config)
            .field("channels", &self.channel_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut stream: MessageStream,
    incoming: mpsc::UnboundedSender<Channel>,
    cancel: CancellationToken,
) -> Result<()> {
    let result = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            next = stream.next() => next,
        };

        let msg = match next {
            None => {
                debug!("transport reached eof");
                break Ok(());
            }
            Some(Err(err)) => {
                if shared.is_closed() {
                    break Ok(());
                }
                warn!(error = %err, "session read failed");
                break Err(err);
            }
            Some(Ok(msg)) => msg,
        };
        trace!(kind = kind_name(msg.kind()), channel = ?msg.channel_id(), "dispatch");

        if let Message::Open {
            sender_id,
            window_size,
            max_packet_size,
        } = msg
        {
            if let Err(err) =
                handle_open(&shared, &incoming, sender_id, window_size, max_packet_size).await
            {
                break Err(err);
            }
            continue;
        }

        let id = msg.channel_id().unwrap_or_default();
        let Some(channel) = shared.channel(id) else {
            if shared.is_closed() {
                break Ok(());
            }
            warn!(channel = id, kind = kind_name(msg.kind()), "message for unknown channel");
            continue;
        };

        match channel.handle(msg).await {
            Ok(()) => {}
            Err(MuxError::Io(err)) => break Err(MuxError::Io(err)),
            Err(err) => {
                warn!(channel = id, error = %err, "peer violated channel limits; closing channel");
                if let Err(err) = channel.reject().await {
                    break Err(err);
                }
            }
        }
    };

    shared.teardown().await;
    result
}

async fn handle_open(
    shared: &Arc<Shared>,
    incoming: &mpsc::UnboundedSender<Channel>,
    sender_id: u32,
    window_size: u32,
    max_packet_size: u32,
) -> Result<()> {
    if !(MIN_PACKET_LENGTH..=MAX_PACKET_LENGTH).contains(&max_packet_size) {
        debug!(sender_id, max_packet_size, "rejecting open: packet size out of range");
        return shared
            .send(Message::OpenFailure {
                channel_id: sender_id,
            })
            .await;
    }

    let channel = shared.new_channel(None);
    channel.set_remote(sender_id, window_size, max_packet_size);
    shared
        .send(Message::OpenConfirm {
            channel_id: sender_id,
            sender_id: channel.id(),
            window_size: shared.config.window_size,
            max_packet_size: shared.config.max_packet_size,
        })
        .await?;
    debug!(channel = channel.id(), remote_id = sender_id, "channel accepted");

    if incoming.send(channel).is_err() {
        trace!("accept queue dropped");
    }
    Ok(())
}
