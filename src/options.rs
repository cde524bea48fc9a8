//! Client and registration options.
//!
//! An option knows how to apply itself to a [`ClientConfig`], a
//! [`RegisterConfig`], or both. Options are applied in order, so when two
//! options write the same field the later one wins.
//!
//! Client-only options implement only [`ClientOption`]; passing one where a
//! [`RegisterOption`] is expected does not compile.
//!
//! ```
//! use rpcwire::codec::JsonCodec;
//! use rpcwire::options::{protocol, ClientConfig, DisableEnveloping, Multiplexed, RegisterConfig};
//!
//! let client = ClientConfig::from_options(&[&Multiplexed, &protocol(JsonCodec)]);
//! assert!(client.multiplexed);
//! assert_eq!(client.protocol.name(), "json");
//!
//! let register = RegisterConfig::from_options(&[&DisableEnveloping]);
//! assert!(register.disable_enveloping);
//! ```

use std::sync::Arc;

use crate::codec::{default_codec, Codec};

/// Configuration of an outbound, fixed at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Envelope codec.
    pub protocol: Arc<dyn Codec>,
    /// Send bare bodies instead of envelopes.
    pub disable_enveloping: bool,
    /// Qualify envelope names as `service:procedure`.
    pub multiplexed: bool,
}

impl ClientConfig {
    pub fn from_options(options: &[&dyn ClientOption]) -> Self {
        let mut config = Self::default();
        for option in options {
            option.apply_client_option(&mut config);
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: default_codec(),
            disable_enveloping: false,
            multiplexed: false,
        }
    }
}

/// Configuration of a registered procedure, fixed at registration.
#[derive(Debug, Clone)]
pub struct RegisterConfig {
    /// Envelope codec.
    pub protocol: Arc<dyn Codec>,
    /// Expect bare bodies instead of envelopes.
    pub disable_enveloping: bool,
}

impl RegisterConfig {
    pub fn from_options(options: &[&dyn RegisterOption]) -> Self {
        let mut config = Self::default();
        for option in options {
            option.apply_register_option(&mut config);
        }
        config
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            protocol: default_codec(),
            disable_enveloping: false,
        }
    }
}

/// Customizes an outbound.
pub trait ClientOption: Send + Sync {
    fn apply_client_option(&self, config: &mut ClientConfig);
}

/// Customizes a procedure registration.
pub trait RegisterOption: Send + Sync {
    fn apply_register_option(&self, config: &mut RegisterConfig);
}

/// An option valid on both sides.
pub trait SharedOption: ClientOption + RegisterOption {}

impl<T: ClientOption + RegisterOption> SharedOption for T {}

/// Disable enveloping of requests and responses.
///
/// Must be given on both sides: a client that envelopes talking to a handler
/// that does not (or the reverse) fails every call with a protocol error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisableEnveloping;

impl ClientOption for DisableEnveloping {
    fn apply_client_option(&self, config: &mut ClientConfig) {
        config.disable_enveloping = true;
    }
}

impl RegisterOption for DisableEnveloping {
    fn apply_register_option(&self, config: &mut RegisterConfig) {
        config.disable_enveloping = true;
    }
}

/// Qualify outgoing envelope names with the service name.
///
/// Client-only. Use it when the remote listener serves several services that
/// share procedure names.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiplexed;

impl ClientOption for Multiplexed {
    fn apply_client_option(&self, config: &mut ClientConfig) {
        config.multiplexed = true;
    }
}

/// Select the envelope codec. Defaults to [`BinaryCodec`](crate::codec::BinaryCodec).
#[derive(Debug, Clone)]
pub struct Protocol(pub Arc<dyn Codec>);

/// Shorthand for `Protocol(Arc::new(codec))`.
pub fn protocol(codec: impl Codec) -> Protocol {
    Protocol(Arc::new(codec))
}

impl ClientOption for Protocol {
    fn apply_client_option(&self, config: &mut ClientConfig) {
        config.protocol = Arc::clone(&self.0);
    }
}

impl RegisterOption for Protocol {
    fn apply_register_option(&self, config: &mut RegisterConfig) {
        config.protocol = Arc::clone(&self.0);
    }
}
