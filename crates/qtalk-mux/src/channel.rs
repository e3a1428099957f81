//! One flow-controlled logical stream multiplexed over a session.
//!
//! Outbound bytes are gated on `remote_win`, the credit granted by the peer.
//! Inbound bytes are buffered against `my_window` and every read hands the
//! consumed byte count back to the peer as a WindowAdjust.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace};

use crate::codec::{Message, MAX_PACKET_LENGTH};
use crate::error::{MuxError, Result};
use crate::session::{SessionConfig, Shared};

/// A multiplexed channel.
///
/// Cloning yields another handle to the same channel. Reads are served in
/// FIFO order among concurrent readers, and likewise for writes.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

pub(crate) struct ChannelInner {
    id: u32,
    session: Weak<Shared>,
    state: Mutex<ChannelState>,
    /// Data, EOF or shutdown arrived.
    readable: Notify,
    /// Window credit arrived, or the write side ended.
    credit: Notify,
    /// The channel shut down.
    closed: Notify,
    read_order: tokio::sync::Mutex<()>,
    write_order: tokio::sync::Mutex<()>,
}

#[derive(Debug)]
struct ChannelState {
    remote_id: u32,
    my_window: u32,
    remote_win: u32,
    max_incoming_payload: u32,
    max_remote_payload: u32,
    read_buf: BytesMut,
    got_eof: bool,
    sent_eof: bool,
    sent_close: bool,
    shutdown: bool,
    ready: Option<oneshot::Sender<bool>>,
}

impl Channel {
    pub(crate) fn new(
        id: u32,
        session: Weak<Shared>,
        config: &SessionConfig,
        ready: Option<oneshot::Sender<bool>>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                id,
                session,
                state: Mutex::new(ChannelState {
                    remote_id: 0,
                    my_window: config.window_size,
                    remote_win: 0,
                    max_incoming_payload: config.max_packet_size,
                    max_remote_payload: 0,
                    read_buf: BytesMut::new(),
                    got_eof: false,
                    sent_eof: false,
                    sent_close: false,
                    shutdown: false,
                    ready,
                }),
                readable: Notify::new(),
                credit: Notify::new(),
                closed: Notify::new(),
                read_order: tokio::sync::Mutex::new(()),
                write_order: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Local channel id (the index in this session's channel table).
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// The id the peer uses for this channel.
    pub fn remote_id(&self) -> u32 {
        self.state().remote_id
    }

    /// Largest Data payload this side accepts.
    pub fn max_incoming_payload(&self) -> u32 {
        self.state().max_incoming_payload
    }

    /// Largest Data payload the peer accepts.
    pub fn max_remote_payload(&self) -> u32 {
        self.state().max_remote_payload
    }

    /// Bytes this side may currently send without further credit.
    pub fn remote_window(&self) -> u32 {
        self.state().remote_win
    }

    /// Returns true once the channel has shut down.
    pub fn is_closed(&self) -> bool {
        self.state().shutdown
    }

    /// Read buffered bytes into `buf`.
    ///
    /// Suspends until data, EOF or shutdown. Returns `Ok(0)` at end of
    /// stream. Every successful read returns the consumed credit to the peer.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let _turn = self.inner.read_order.lock().await;

        loop {
            let readable = self.inner.readable.notified();
            let taken = {
                let mut st = self.state();
                if !st.read_buf.is_empty() {
                    let n = buf.len().min(st.read_buf.len());
                    buf[..n].copy_from_slice(&st.read_buf[..n]);
                    st.read_buf.advance(n);
                    // A peer that saw our Close may already have reused its id.
                    let adjust = !st.sent_close && !st.shutdown;
                    if adjust {
                        st.my_window += n as u32;
                    }
                    Some((n, adjust.then_some(st.remote_id)))
                } else if st.got_eof || st.shutdown {
                    return Ok(0);
                } else {
                    None
                }
            };

            match taken {
                Some((n, Some(remote_id))) => {
                    let adjust = Message::WindowAdjust {
                        channel_id: remote_id,
                        additional_bytes: n as u32,
                    };
                    if let Err(err) = self.send(adjust).await {
                        debug!(channel = self.inner.id, error = %err, "window adjust not sent");
                    }
                    return Ok(n);
                }
                Some((n, None)) => return Ok(n),
                None => readable.await,
            }
        }
    }

    /// Read until `buf` is full.
    ///
    /// Returns `Ok(false)` if the stream ended before any byte was read and
    /// an `UnexpectedEof` I/O error if it ended part-way.
    pub async fn read_exact(&self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(MuxError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {filled} of {} bytes", buf.len()),
                )));
            }
            filled += n;
        }
        Ok(true)
    }

    /// Write all of `buf`, suspending whenever the peer's window is exhausted.
    ///
    /// Each Data message carries at most `min(remote window, max remote payload)`
    /// bytes. Returns the number of bytes written, which is always `buf.len()`.
    /// Once the last byte is sent the write succeeds even if the peer closes
    /// the channel before the writer resumes.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let _turn = self.inner.write_order.lock().await;
        let mut written = 0;

        loop {
            let credit = self.inner.credit.notified();
            let reserved = {
                let mut st = self.state();
                if st.sent_close || st.shutdown {
                    return Err(MuxError::ChannelClosed);
                }
                if st.sent_eof {
                    return Err(MuxError::WriteAfterEof);
                }
                if written == buf.len() {
                    return Ok(written);
                }
                let remaining = (buf.len() - written).min(u32::MAX as usize) as u32;
                let n = st.remote_win.min(st.max_remote_payload).min(remaining);
                if n > 0 {
                    st.remote_win -= n;
                    Some((st.remote_id, n as usize))
                } else {
                    None
                }
            };

            match reserved {
                Some((remote_id, n)) => {
                    let data = Bytes::copy_from_slice(&buf[written..written + n]);
                    self.send(Message::Data {
                        channel_id: remote_id,
                        data,
                    })
                    .await?;
                    written += n;
                    if written == buf.len() {
                        return Ok(written);
                    }
                }
                None => {
                    trace!(channel = self.inner.id, written, "waiting for window credit");
                    credit.await;
                }
            }
        }
    }

    /// Signal that no more data will be written. Idempotent.
    pub async fn close_write(&self) -> Result<()> {
        let remote_id = {
            let mut st = self.state();
            if st.sent_close || st.shutdown {
                return Err(MuxError::ChannelClosed);
            }
            if st.sent_eof {
                return Ok(());
            }
            st.sent_eof = true;
            st.remote_id
        };
        self.inner.credit.notify_waiters();
        self.send(Message::Eof {
            channel_id: remote_id,
        })
        .await
    }

    /// Send Close and wait until the peer's Close has been processed.
    ///
    /// Only the first call sends Close; later calls return immediately.
    pub async fn close(&self) -> Result<()> {
        let closed = self.inner.closed.notified();
        let remote_id = {
            let mut st = self.state();
            if st.sent_close || st.shutdown {
                return Ok(());
            }
            st.sent_close = true;
            st.remote_id
        };
        self.inner.credit.notify_waiters();
        debug!(channel = self.inner.id, remote_id, "closing channel");

        if let Err(err) = self
            .send(Message::Close {
                channel_id: remote_id,
            })
            .await
        {
            self.shutdown();
            return Err(err);
        }
        closed.await;
        Ok(())
    }

    /// Apply one message addressed to this channel. Called by the session loop.
    pub(crate) async fn handle(&self, msg: Message) -> Result<()> {
        match msg {
            Message::Data { data, .. } => self.handle_data(data),
            Message::Eof { .. } => {
                self.state().got_eof = true;
                self.inner.readable.notify_waiters();
                Ok(())
            }
            Message::Close { .. } => self.handle_close().await,
            Message::OpenFailure { .. } => {
                debug!(channel = self.inner.id, "open rejected by peer");
                self.resolve_ready(false);
                self.shutdown();
                Ok(())
            }
            Message::OpenConfirm {
                sender_id,
                window_size,
                max_packet_size,
                ..
            } => {
                {
                    let mut st = self.state();
                    st.remote_id = sender_id;
                    st.remote_win = window_size;
                    st.max_remote_payload = max_packet_size;
                }
                if !self.resolve_ready(true) {
                    debug!(channel = self.inner.id, "open abandoned before confirm");
                    return self.reject().await;
                }
                self.inner.credit.notify_waiters();
                Ok(())
            }
            Message::WindowAdjust {
                additional_bytes, ..
            } => {
                {
                    let mut st = self.state();
                    st.remote_win = st
                        .remote_win
                        .checked_add(additional_bytes)
                        .filter(|win| *win <= MAX_PACKET_LENGTH)
                        .ok_or(MuxError::InvalidWindowAdjust(additional_bytes))?;
                }
                self.inner.credit.notify_waiters();
                Ok(())
            }
            Message::Open { .. } => Ok(()),
        }
    }

    fn handle_data(&self, data: Bytes) -> Result<()> {
        {
            let mut st = self.state();
            if st.got_eof || st.shutdown {
                trace!(channel = self.inner.id, len = data.len(), "dropping data after eof");
                return Ok(());
            }
            if data.len() > st.max_incoming_payload as usize {
                return Err(MuxError::PayloadTooLarge {
                    size: data.len(),
                    max: st.max_incoming_payload as usize,
                });
            }
            let len = data.len() as u32;
            if len > st.my_window {
                return Err(MuxError::WindowExceeded {
                    size: len,
                    window: st.my_window,
                });
            }
            st.my_window -= len;
            st.read_buf.extend_from_slice(&data);
        }
        self.inner.readable.notify_waiters();
        Ok(())
    }

    async fn handle_close(&self) -> Result<()> {
        let reply = {
            let mut st = self.state();
            let reply = !st.sent_close;
            st.sent_close = true;
            reply.then_some(st.remote_id)
        };
        let sent = match reply {
            Some(remote_id) => {
                self.send(Message::Close {
                    channel_id: remote_id,
                })
                .await
            }
            None => Ok(()),
        };
        self.shutdown();
        sent
    }

    /// Stop accepting data after a peer violation and start the close handshake.
    pub(crate) async fn reject(&self) -> Result<()> {
        let reply = {
            let mut st = self.state();
            st.got_eof = true;
            let reply = !st.sent_close && !st.shutdown;
            st.sent_close = true;
            reply.then_some(st.remote_id)
        };
        self.inner.readable.notify_waiters();
        self.inner.credit.notify_waiters();
        match reply {
            Some(remote_id) => {
                self.send(Message::Close {
                    channel_id: remote_id,
                })
                .await
            }
            None => Ok(()),
        }
    }

    /// Tear the channel down: wake every waiter with end-of-stream, fail a
    /// pending open, and release the table slot.
    pub(crate) fn shutdown(&self) {
        {
            let mut st = self.state();
            if st.shutdown {
                return;
            }
            st.shutdown = true;
            if let Some(ready) = st.ready.take() {
                let _ = ready.send(false);
            }
        }
        trace!(channel = self.inner.id, "channel shut down");
        if let Some(session) = self.inner.session.upgrade() {
            session.remove_channel(self);
        }
        self.inner.readable.notify_waiters();
        self.inner.credit.notify_waiters();
        self.inner.closed.notify_waiters();
    }

    pub(crate) fn set_remote(&self, remote_id: u32, window_size: u32, max_packet_size: u32) {
        let mut st = self.state();
        st.remote_id = remote_id;
        st.remote_win = window_size;
        st.max_remote_payload = max_packet_size;
    }

    pub(crate) fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns false if the opener stopped waiting for the outcome.
    fn resolve_ready(&self, ok: bool) -> bool {
        let ready = self.state().ready.take();
        match ready {
            Some(ready) => ready.send(ok).is_ok(),
            None => true,
        }
    }

    async fn send(&self, msg: Message) -> Result<()> {
        let session = self.inner.session.upgrade().ok_or(MuxError::SessionClosed)?;
        session.send(msg).await
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        // State updates never panic while holding the lock.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state();
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("remote_id", &st.remote_id)
            .field("my_window", &st.my_window)
            .field("remote_win", &st.remote_win)
            .field("buffered", &st.read_buf.len())
            .field("sent_eof", &st.sent_eof)
            .field("sent_close", &st.sent_close)
            .field("shutdown", &st.shutdown)
            .finish()
    }
}
