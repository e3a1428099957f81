//! Multiplexed channels and call/respond RPC over a single byte stream.
//!
//! qtalk runs many flow-controlled channels over one ordered, reliable
//! transport and layers selector-routed RPC on top of them.
//!
//! # Crate Structure
//!
//! - [`transport`]: Transport contract, in-memory pipe, Unix domain sockets
//! - [`mux`]: Wire messages, channels and the session dispatch loop
//! - [`rpc`]: Framed values, calls, responders and selector routing
//! - [`peer`]: Peers that both call and serve (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use qtalk_transport::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use qtalk_mux::*;
}

/// Re-export RPC types.
pub mod rpc {
    pub use qtalk_rpc::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use qtalk_peer::*;
}
