use qtalk_mux::{Channel, Session};
use qtalk_transport::pipe;

/// Two sessions over an in-memory pipe. Keep it alive for the channels' sake.
pub(crate) struct Sessions {
    pub(crate) left: Session,
    pub(crate) right: Session,
}

pub(crate) fn session_pair() -> Sessions {
    let (left, right) = pipe();
    Sessions {
        left: Session::new(left),
        right: Session::new(right),
    }
}

/// A connected channel: the left end was opened, the right end accepted.
pub(crate) async fn channel_pair() -> (Sessions, Channel, Channel) {
    let sessions = session_pair();
    let (opened, accepted) = tokio::join!(sessions.left.open(), sessions.right.accept());
    let opened = opened.expect("open should succeed");
    let accepted = accepted.expect("accept should yield a channel");
    (sessions, opened, accepted)
}
