//! Byte-stream transports for qtalk sessions.
//!
//! A session runs over any reliable, ordered, non-duplicating byte stream:
//! anything implementing [`Transport`] works. This crate provides the two
//! concrete streams used in practice:
//! - in-memory pipes (tests, in-process workers)
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of qtalk. Everything else builds on top of
//! the [`TransportStream`] type provided here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{pipe, pipe_with_capacity, Transport, TransportStream, DEFAULT_PIPE_CAPACITY};

#[cfg(unix)]
pub use uds::{connect, UdsListener, SOCKET_MODE};
