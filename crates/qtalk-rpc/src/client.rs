use qtalk_mux::{Channel, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, RpcError};
use crate::frame::FrameCodec;
use crate::header::{RequestHeader, ResponseHeader};

/// Issues calls over a session, one channel per call.
#[derive(Debug, Clone)]
pub struct Client<C = JsonCodec> {
    session: Session,
    frames: FrameCodec<C>,
}

impl<C: Codec> Client<C> {
    pub fn new(session: Session, frames: FrameCodec<C>) -> Self {
        Self { session, frames }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn frames(&self) -> &FrameCodec<C> {
        &self.frames
    }

    /// Call `selector` with `args`.
    ///
    /// A unary response closes the channel before returning. A continued
    /// response leaves it open on the returned [`Response`].
    pub async fn call<A, R>(&self, selector: &str, args: &A) -> Result<Response<R, C>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let channel = self.session.open().await?;
        debug!(selector, channel = channel.id(), "call");

        match self.exchange(&channel, selector, args).await {
            Ok((value, continues)) => {
                if !continues {
                    channel.close().await?;
                }
                Ok(Response {
                    value,
                    continues,
                    channel,
                    frames: self.frames.clone(),
                })
            }
            Err(err) => {
                if let Err(close_err) = channel.close().await {
                    debug!(channel = channel.id(), error = %close_err, "close after failed call");
                }
                Err(err)
            }
        }
    }

    async fn exchange<A, R>(&self, channel: &Channel, selector: &str, args: &A) -> Result<(R, bool)>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let header = RequestHeader {
            selector: selector.to_string(),
        };
        self.frames.encode(channel, &header).await?;
        self.frames.encode(channel, args).await?;

        let header: ResponseHeader = self
            .frames
            .decode(channel)
            .await?
            .ok_or(RpcError::MissingValue("response header"))?;
        if let Some(message) = header.error {
            return Err(RpcError::Remote(message));
        }
        let value = self
            .frames
            .decode(channel)
            .await?
            .ok_or(RpcError::MissingValue("response value"))?;
        Ok((value, header.continues))
    }

    /// A view of this client that prefixes every selector with `prefix`.
    pub fn namespace(&self, prefix: &str) -> Namespace<'_, C> {
        Namespace {
            client: self,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }
}

/// Selector prefix builder: `client.namespace("math").call("add", ..)`
/// calls `math/add`.
#[derive(Debug, Clone)]
pub struct Namespace<'a, C = JsonCodec> {
    client: &'a Client<C>,
    prefix: String,
}

impl<C: Codec> Namespace<'_, C> {
    /// Nest a further prefix.
    pub fn namespace(&self, prefix: &str) -> Self {
        Self {
            client: self.client,
            prefix: self.selector(prefix.trim_end_matches('/')),
        }
    }

    /// The full selector for `name` under this prefix.
    pub fn selector(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        if self.prefix.is_empty() {
            return name.to_string();
        }
        format!("{}/{}", self.prefix, name)
    }

    pub async fn call<A, R>(&self, name: &str, args: &A) -> Result<Response<R, C>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.client.call(&self.selector(name), args).await
    }
}

/// The outcome of a successful call.
#[derive(Debug)]
pub struct Response<R, C = JsonCodec> {
    /// The first response value.
    pub value: R,
    /// The responder kept the channel open.
    pub continues: bool,
    channel: Channel,
    frames: FrameCodec<C>,
}

impl<R, C: Codec> Response<R, C> {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn into_value(self) -> R {
        self.value
    }

    /// Read the next streamed value; `None` once the responder is done.
    pub async fn receive<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.frames.decode(&self.channel).await
    }

    /// Send a further value to the responder.
    pub async fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.frames.encode(&self.channel, value).await
    }

    pub async fn close(&self) -> Result<()> {
        Ok(self.channel.close().await?)
    }
}
