use futures_util::{SinkExt, StreamExt};
use qtalk_transport::{pipe, TransportStream};
use tokio::io::{ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Message, MessageCodec};
use crate::session::{Session, SessionConfig};

/// Speaks the wire protocol by hand against a real session.
pub(crate) struct RawPeer {
    reader: FramedRead<ReadHalf<TransportStream>, MessageCodec>,
    writer: FramedWrite<WriteHalf<TransportStream>, MessageCodec>,
}

impl RawPeer {
    pub(crate) async fn send(&mut self, msg: Message) {
        self.writer.send(msg).await.expect("raw send should succeed");
    }

    pub(crate) async fn recv(&mut self) -> Message {
        self.reader
            .next()
            .await
            .expect("stream should not end")
            .expect("message should decode")
    }

    /// Returns the next message if one arrives within a short grace period.
    pub(crate) async fn try_recv(&mut self) -> Option<Message> {
        tokio::time::timeout(std::time::Duration::from_millis(50), self.reader.next())
            .await
            .ok()
            .flatten()
            .and_then(Result::ok)
    }

    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.writer
            .get_mut()
            .write_all(bytes)
            .await
            .expect("raw write should succeed");
    }
}

pub(crate) fn session_with_raw_peer(config: SessionConfig) -> (Session, RawPeer) {
    let (left, right) = pipe();
    let session = Session::with_config(left, config);
    let (read_half, write_half) = tokio::io::split(right);
    let raw = RawPeer {
        reader: FramedRead::new(read_half, MessageCodec::default()),
        writer: FramedWrite::new(write_half, MessageCodec::default()),
    };
    (session, raw)
}

pub(crate) fn session_pair(
    left_config: SessionConfig,
    right_config: SessionConfig,
) -> (Session, Session) {
    let (left, right) = pipe();
    (
        Session::with_config(left, left_config),
        Session::with_config(right, right_config),
    )
}
