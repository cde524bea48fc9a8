//! Codec module - pluggable envelope encodings.
//!
//! A [`Codec`] turns an [`Envelope`](crate::envelope::Envelope) into bytes
//! and back. The envelope layer calls it once per payload per direction.
//!
//! - [`BinaryCodec`] - strict binary envelope layout (default)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`; also encodes typed
//!   handler payloads
//! - [`JsonCodec`] - JSON using `serde_json`, handy when debugging on the wire
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::{BinaryCodec, Codec};
//! use rpcwire::envelope::{Envelope, EnvelopeKind};
//! use bytes::Bytes;
//!
//! let envelope = Envelope::new("hello", EnvelopeKind::Call, Bytes::from_static(b"body"));
//! let encoded = BinaryCodec.encode_envelope(&envelope).unwrap();
//! assert_eq!(BinaryCodec.decode_envelope(encoded).unwrap(), envelope);
//! ```

mod binary;
mod json;
mod msgpack;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::envelope::Envelope;
use crate::error::Result;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Envelope encoding.
///
/// Implementations must be symmetric: `decode_envelope(encode_envelope(e))`
/// yields `e`. Decode failures are reported as [`RpcError::Decode`].
///
/// [`RpcError::Decode`]: crate::error::RpcError::Decode
pub trait Codec: fmt::Debug + Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes>;

    fn decode_envelope(&self, data: Bytes) -> Result<Envelope>;
}

/// Codec used when no `Protocol` option is given.
pub fn default_codec() -> Arc<dyn Codec> {
    Arc::new(BinaryCodec)
}
