//! Caller-facing surface over an [`Outbound`].
//!
//! A [`Channel`] names who is calling which service over which outbound;
//! a [`Client`] builds requests on it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpcwire::client::{Channel, Client};
//! use rpcwire::transport::tcp::TcpTransport;
//! use rpcwire::transport::{Context, Outbound};
//!
//! # async fn demo() -> rpcwire::Result<()> {
//! let outbound = Arc::new(TcpTransport::new().new_outbound("127.0.0.1:4040", &[])?);
//! outbound.start().await?;
//!
//! let client = Client::new(Channel::new("foo", "bar", outbound));
//! let res = client.call(&Context::background(), "hello", "").await?;
//! assert!(!res.application_error);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::transport::{encoding, Context, Outbound, Request, Response};

/// Caller identity, target service and the outbound to reach it.
#[derive(Clone)]
pub struct Channel {
    caller: String,
    service: String,
    outbound: Arc<dyn Outbound>,
}

impl Channel {
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            caller: caller.into(),
            service: service.into(),
            outbound,
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn outbound(&self) -> &Arc<dyn Outbound> {
        &self.outbound
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("caller", &self.caller)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Issues calls on a [`Channel`].
#[derive(Debug, Clone)]
pub struct Client {
    channel: Channel,
    encoding: String,
}

impl Client {
    /// A client sending raw-encoded requests.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            encoding: encoding::RAW.to_string(),
        }
    }

    /// Declare a different request encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// A request for `procedure` pre-filled with this client's identity.
    pub fn request(&self, procedure: impl Into<String>) -> Request {
        Request::new(&*self.channel.caller, &*self.channel.service, procedure)
            .with_encoding(self.encoding.as_str())
    }

    /// Call `procedure` with `body`.
    ///
    /// Application errors come back as `Ok` with
    /// [`Response::application_error`] set; use
    /// [`Response::into_result`] to fold them into the error path.
    pub async fn call(
        &self,
        ctx: &Context,
        procedure: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Result<Response> {
        self.send(ctx, self.request(procedure).with_body(body)).await
    }

    /// Send a fully built request.
    pub async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        self.channel.outbound.call(ctx, request).await
    }

    /// Call a procedure served by a
    /// [`TypedHandler`](crate::handler::TypedHandler).
    ///
    /// Application errors are returned as
    /// [`RpcError::Application`](crate::error::RpcError::Application).
    pub async fn call_typed<T, R>(
        &self,
        ctx: &Context,
        procedure: impl Into<String>,
        value: &T,
    ) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = self
            .request(procedure)
            .with_encoding(encoding::MSGPACK)
            .with_body(MsgPackCodec::encode(value)?);
        let response = self.send(ctx, request).await?.into_result()?;
        MsgPackCodec::decode(&response.body)
    }
}
