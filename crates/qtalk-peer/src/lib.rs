//! Peers: one session that both makes and serves RPC calls.
//!
//! A [`Peer`] bundles a [`Session`](qtalk_mux::Session), a
//! [`Client`](qtalk_rpc::Client) and a [`RespondMux`](qtalk_rpc::RespondMux).
//! Build one over any transport, over an in-memory pipe with
//! [`Peer::pair`], or over a Unix socket with [`connect`] and
//! [`PeerListener`].

pub mod connector;
pub mod error;
#[cfg(unix)]
pub mod listener;
pub mod peer;

pub use connector::{connect, connect_with_config};
pub use error::{PeerError, Result};
#[cfg(unix)]
pub use listener::PeerListener;
pub use peer::{Peer, PeerConfig};
