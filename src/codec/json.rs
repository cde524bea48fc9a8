//! JSON envelope codec using `serde_json`.

use bytes::Bytes;

use super::Codec;
use crate::envelope::Envelope;
use crate::error::{Result, RpcError};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(envelope)?))
    }

    fn decode_envelope(&self, data: Bytes) -> Result<Envelope> {
        serde_json::from_slice(&data).map_err(|e| RpcError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new("hello", EnvelopeKind::Call, Bytes::from_static(b"{}"));
        let encoded = JsonCodec.encode_envelope(&envelope).unwrap();
        assert!(encoded.starts_with(b"{"));
        assert_eq!(JsonCodec.decode_envelope(encoded).unwrap(), envelope);
    }

    #[test]
    fn test_garbage_is_malformed_payload() {
        let err = JsonCodec
            .decode_envelope(Bytes::from_static(b"derp"))
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
