//! TCP binding of the [`Inbound`](super::Inbound) and
//! [`Outbound`](super::Outbound) contracts.
//!
//! Each connection carries multiplexed request/response frames (see
//! [`crate::protocol`]). Outbounds share one lazily dialed connection
//! across all calls; inbounds serve each request in its own task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpcwire::handler::{handler_fn, MapRegistry};
//! use rpcwire::transport::tcp::TcpTransport;
//! use rpcwire::transport::{Context, Inbound, Outbound, Request, Response};
//!
//! # async fn demo() -> rpcwire::Result<()> {
//! let transport = TcpTransport::new();
//!
//! let registry = Arc::new(MapRegistry::new());
//! registry.register("bar", "hello", handler_fn(|_ctx, _req| async { Ok(Response::empty()) }));
//!
//! let inbound = transport.new_inbound("127.0.0.1:0");
//! inbound.set_registry(registry);
//! inbound.start().await?;
//!
//! let addr = inbound.addr().expect("running");
//! let outbound = transport.new_outbound(&addr.to_string(), &[])?;
//! outbound.start().await?;
//! let res = outbound
//!     .call(&Context::background(), Request::new("foo", "bar", "hello"))
//!     .await?;
//! assert!(res.body.is_empty());
//! # Ok(())
//! # }
//! ```

mod inbound;
mod mux;
mod outbound;
mod writer;

use std::time::Duration;

use crate::error::Result;
use crate::options::{ClientConfig, ClientOption};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

pub use inbound::TcpInbound;
pub use mux::Mux;
pub use outbound::TcpOutbound;
pub use writer::{
    WriterConfig, DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_MAX_PENDING_FRAMES,
};

/// How long `stop` lets in-flight requests finish before cancelling them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handlers running at once per inbound before requests are turned away.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Settings shared by every inbound and outbound of a [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub shutdown_grace: Duration,
    pub max_concurrent_handlers: usize,
    /// Upper bound on metadata plus body of one frame.
    pub max_payload_size: u32,
    pub writer: WriterConfig,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max;
        self
    }

    pub fn max_payload_size(mut self, max: u32) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

/// Factory for TCP inbounds and outbounds sharing one [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// An inbound that will listen on `addr`. `":port"` means all interfaces.
    pub fn new_inbound(&self, addr: &str) -> TcpInbound {
        TcpInbound::new(addr, self.config.clone())
    }

    /// An inbound that serves RPC on `pattern` and hands every other path
    /// to `mux`.
    pub fn new_inbound_with_mux(&self, addr: &str, pattern: &str, mux: Mux) -> TcpInbound {
        TcpInbound::new(addr, self.config.clone()).with_mux(pattern, mux)
    }

    /// An outbound calling `target` (`[tcp://]host:port[/path]`).
    pub fn new_outbound(
        &self,
        target: &str,
        options: &[&dyn ClientOption],
    ) -> Result<TcpOutbound> {
        Ok(TcpOutbound::new(
            target.parse()?,
            ClientConfig::from_options(options),
            self.config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_config_defaults_and_setters() {
        let config = TransportConfig::new();
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);

        let config = config
            .shutdown_grace(Duration::from_millis(10))
            .max_concurrent_handlers(1)
            .max_payload_size(1024);
        assert_eq!(config.shutdown_grace, Duration::from_millis(10));
        assert_eq!(config.max_concurrent_handlers, 1);
        assert_eq!(config.max_payload_size, 1024);
    }

    #[test]
    fn test_new_outbound_rejects_bad_target() {
        let err = TcpTransport::new().new_outbound("nowhere", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
