//! Answering one inbound call.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use qtalk_mux::Channel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::Client;
use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, RpcError};
use crate::frame::FrameCodec;
use crate::header::{RequestHeader, ResponseHeader};
use crate::mux::Handler;

/// An inbound call as seen by a handler.
#[derive(Debug)]
pub struct Call<C = JsonCodec> {
    selector: String,
    channel: Channel,
    frames: FrameCodec<C>,
    caller: Client<C>,
}

impl<C: Codec> Call<C> {
    /// The selector exactly as the caller sent it.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Read the next value sent by the caller. The first is the call's arguments.
    pub async fn receive<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.frames.decode(&self.channel).await
    }

    /// A client over the same session, for calls back to the caller.
    pub fn caller(&self) -> &Client<C> {
        &self.caller
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

/// Sends the single response to a call.
#[derive(Debug)]
pub struct Responder<C = JsonCodec> {
    channel: Channel,
    frames: FrameCodec<C>,
    responded: bool,
}

impl<C: Codec> Responder<C> {
    pub fn new(channel: Channel, frames: FrameCodec<C>) -> Self {
        Self {
            channel,
            frames,
            responded: false,
        }
    }

    /// Returns true once a response header has been sent.
    pub fn responded(&self) -> bool {
        self.responded
    }

    /// Respond with `value` and close the channel.
    pub async fn return_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.send_response(None, false, value).await?;
        Ok(self.channel.close().await?)
    }

    /// Respond with an error message and a null value, then close the channel.
    pub async fn return_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.send_response(Some(message.into()), false, &()).await?;
        Ok(self.channel.close().await?)
    }

    /// Respond with `value` and keep the channel open for further values.
    pub async fn continue_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Channel> {
        self.send_response(None, true, value).await?;
        Ok(self.channel.clone())
    }

    /// Stream another value after [`continue_value`](Self::continue_value).
    pub async fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.frames.encode(&self.channel, value).await
    }

    async fn send_response<T: Serialize + ?Sized>(
        &mut self,
        error: Option<String>,
        continues: bool,
        value: &T,
    ) -> Result<()> {
        if self.responded {
            return Err(RpcError::AlreadyResponded);
        }
        self.responded = true;
        let header = ResponseHeader { error, continues };
        self.frames.encode(&self.channel, &header).await?;
        self.frames.encode(&self.channel, value).await
    }
}

/// Serve one call arriving on `channel` with `handler`.
///
/// Exactly one response is sent: a handler that finishes without
/// responding gets a null return, and one that fails or panics first gets
/// an error response. The channel is closed afterwards.
pub async fn respond<C: Codec>(
    handler: &dyn Handler<C>,
    channel: Channel,
    caller: Client<C>,
) -> Result<()> {
    let frames = caller.frames().clone();
    let header: RequestHeader = match frames.decode(&channel).await {
        Ok(Some(header)) => header,
        Ok(None) => {
            channel.close().await?;
            return Err(RpcError::MissingValue("call header"));
        }
        Err(err) => {
            channel.close().await?;
            return Err(err);
        }
    };
    debug!(selector = %header.selector, channel = channel.id(), "respond");

    let mut call = Call {
        selector: header.selector,
        channel: channel.clone(),
        frames: frames.clone(),
        caller,
    };
    let mut responder = Responder::new(channel.clone(), frames);

    let outcome = AssertUnwindSafe(handler.respond_rpc(&mut responder, &mut call))
        .catch_unwind()
        .await;
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            warn!(selector = %call.selector, error = %err, "handler failed");
            Some(err.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(selector = %call.selector, panic = %message, "handler panicked");
            Some(format!("handler panicked: {message}"))
        }
    };

    if !responder.responded() {
        let sent = match failure {
            Some(message) => responder.return_error(message).await,
            None => responder.return_value(&()).await,
        };
        if let Err(err) = sent {
            debug!(channel = channel.id(), error = %err, "fallback response not sent");
        }
    }
    Ok(channel.close().await?)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
