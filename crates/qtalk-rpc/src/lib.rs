//! Call/respond RPC over qtalk channels.
//!
//! Every call runs on its own channel:
//! - the caller frames a [`RequestHeader`] (`{"S": selector}`) and the arguments
//! - the responder frames a [`ResponseHeader`] (`{"E": error?, "C": continue}`)
//!   and one value
//! - a unary response closes the channel; a continued one leaves it open
//!   for more framed values in either direction
//!
//! Values are length-prefixed by [`FrameCodec`] and serialized by a [`Codec`].

pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod mux;
pub mod responder;

#[cfg(test)]
mod test_support;

pub use client::{Client, Namespace, Response};
pub use codec::{Codec, JsonCodec};
pub use error::{Result, RpcError};
pub use frame::{FrameCodec, FrameConfig, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE};
pub use header::{RequestHeader, ResponseHeader};
pub use mux::{
    normalize_selector, unary, Handler, NotFoundHandler, PrefixMatcher, RespondMux, Route, Unary,
};
pub use responder::{respond, Call, Responder};

/// Re-exported so handler implementations need not depend on it directly.
pub use async_trait::async_trait;
