//! MessagePack envelopes and typed payloads via `rmp-serde`.
//!
//! Structs go out in map form (`to_vec_named`), which is what non-Rust
//! MessagePack peers decode by default.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::Bytes;

use super::Codec;
use crate::envelope::Envelope;
use crate::error::{Result, RpcError};

/// MessagePack codec for envelopes and structured payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Serialize a typed payload, structs as maps.
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Deserialize a typed payload. Failures surface as
    /// [`RpcError::MsgPackDecode`].
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(Bytes::from(Self::encode(envelope)?))
    }

    fn decode_envelope(&self, data: Bytes) -> Result<Envelope> {
        rmp_serde::from_slice(&data).map_err(|e| RpcError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: TestStruct = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_to_vec_named_produces_map_format() {
        let test = TestStruct {
            id: 1,
            name: "x".to_string(),
            active: false,
        };

        let encoded = MsgPackCodec::encode(&test).unwrap();

        // fixmap is 0x8X, fixarray would be 0x9X
        assert_eq!(encoded[0] & 0xF0, 0x80, "got {:02X}", encoded[0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<TestStruct> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(RpcError::MsgPackDecode(_))));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new(
            "bar:hello",
            EnvelopeKind::Exception,
            Bytes::from_static(&[0, 1, 2, 255]),
        );
        let encoded = MsgPackCodec.encode_envelope(&envelope).unwrap();
        assert_eq!(MsgPackCodec.decode_envelope(encoded).unwrap(), envelope);
    }

    #[test]
    fn test_envelope_decode_failure_is_malformed_payload() {
        let err = MsgPackCodec
            .decode_envelope(Bytes::from_static(b"\xc1"))
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
