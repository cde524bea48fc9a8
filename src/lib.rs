//! # rpcwire
//!
//! RPC middleware with pluggable transports and envelope encodings.
//!
//! A process can serve procedures through an [`Inbound`](transport::Inbound)
//! and call remote ones through an [`Outbound`](transport::Outbound). How
//! bytes move (the transport) and how calls are framed (the envelope codec)
//! are chosen independently.
//!
//! ## Architecture
//!
//! - **Envelope** ([`envelope`]): wraps each body with its method name and
//!   message kind, optionally qualified with the service name
//! - **Frames** ([`protocol`]): binary header plus routing metadata on every
//!   TCP connection
//! - **Dispatch** ([`handler`]): maps `(service, procedure)` to a handler
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpcwire::client::{Channel, Client};
//! use rpcwire::handler::{handler_fn, MapRegistry};
//! use rpcwire::transport::tcp::TcpTransport;
//! use rpcwire::transport::{Context, Inbound, Outbound, Response};
//!
//! #[tokio::main]
//! async fn main() -> rpcwire::Result<()> {
//!     let transport = TcpTransport::new();
//!
//!     let registry = Arc::new(MapRegistry::new());
//!     registry.register("bar", "hello", handler_fn(|_ctx, req| async move {
//!         Ok(Response::new(req.body))
//!     }));
//!
//!     let inbound = transport.new_inbound(":4040");
//!     inbound.set_registry(registry);
//!     inbound.start().await?;
//!
//!     let outbound = Arc::new(transport.new_outbound("127.0.0.1:4040", &[])?);
//!     outbound.start().await?;
//!
//!     let client = Client::new(Channel::new("foo", "bar", outbound.clone()));
//!     let res = client.call(&Context::background(), "hello", "hi").await?;
//!     assert_eq!(&res.body[..], b"hi");
//!
//!     outbound.stop().await?;
//!     inbound.stop().await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod options;
pub mod protocol;
pub mod transport;

pub use error::{ErrorKind, Result, RpcError};
