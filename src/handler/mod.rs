//! Handler module - request handling and dispatch.
//!
//! Provides:
//! - [`Handler`] - the capability an inbound invokes once per request
//! - [`TypedHandler`] - MsgPack-decoding wrapper around a typed function
//! - [`Registry`] / [`MapRegistry`] - maps `(service, procedure)` to a [`HandlerSpec`]
//! - [`Service`] - groups procedures registered under one service name
//!
//! # Example
//!
//! ```
//! use rpcwire::handler::{handler_fn, MapRegistry};
//! use rpcwire::transport::Response;
//!
//! let registry = MapRegistry::new();
//! registry.register("bar", "hello", handler_fn(|_ctx, _req| async { Ok(Response::empty()) }));
//! assert_eq!(registry.len(), 1);
//! ```

mod registry;
mod service;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::transport::{Context, Request, Response};

pub use registry::{HandlerSpec, MapRegistry, Registry, ServiceProcedure};
pub use service::Service;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Serves one procedure.
///
/// Called exactly once per dispatched request. `ctx` carries the caller's
/// deadline and is cancelled when the caller gives up or the inbound stops.
///
/// A returned [`RpcError::Application`](crate::error::RpcError::Application)
/// or [`RpcError::Internal`](crate::error::RpcError::Internal) reaches the
/// caller as an application error. Other classified errors keep their
/// classification.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'static, Result<Response>>;
}

/// Handler backed by an async function over raw requests.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'static, Result<Response>> {
        Box::pin((self.f)(ctx, request))
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

/// Wrapper that deserializes the body before calling the handler and
/// serializes its result into the response body. Both use MsgPack.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(Context, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(Context, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(Context, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'static, Result<Response>> {
        let parsed: T = match MsgPackCodec::decode(&request.body) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(ctx, parsed);
        Box::pin(async move {
            let reply = fut.await?;
            Ok(Response::new(MsgPackCodec::encode(&reply)?))
        })
    }
}
