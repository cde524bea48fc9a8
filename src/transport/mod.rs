//! Transport module - moving requests between processes.
//!
//! [`Inbound`] and [`Outbound`] are the lifecycle contracts; [`tcp`] is the
//! binding over TCP sockets.

mod context;
mod headers;
mod request;
mod target;
pub mod tcp;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::handler::Registry;

pub use context::Context;
pub use headers::Headers;
pub use request::{encoding, Request, Response};
pub use target::{Target, SCHEME};

/// Server side: accepts connections and dispatches requests to a
/// [`Registry`].
///
/// Lifecycle: idle → running → idle. [`addr`](Inbound::addr) is `Some` only
/// while running.
#[async_trait]
pub trait Inbound: Send + Sync {
    /// Bind and start serving.
    ///
    /// On failure the inbound stays idle. A second `start` while running
    /// fails with [`RpcError::AlreadyStarted`](crate::error::RpcError::AlreadyStarted).
    async fn start(&self) -> Result<()>;

    /// Stop serving. In-flight requests get a grace period before they are
    /// cancelled. A no-op when idle.
    async fn stop(&self) -> Result<()>;

    /// Attach the registry requests are dispatched to. May be called before
    /// or after `start`; requests that arrive before it are answered with
    /// `Unavailable`.
    fn set_registry(&self, registry: Arc<dyn Registry>);

    /// The bound address while running.
    fn addr(&self) -> Option<SocketAddr>;
}

/// Client side: sends requests and awaits responses.
///
/// Lifecycle: idle → started → stopped. `call` is valid only while started.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Stop and fail in-flight calls. Idempotent.
    async fn stop(&self) -> Result<()>;

    /// Send `request` and wait for its response under `ctx`.
    ///
    /// A response flagged as an application error is still `Ok`; transport,
    /// protocol and routing failures are `Err`.
    async fn call(&self, ctx: &Context, request: Request) -> Result<Response>;
}
