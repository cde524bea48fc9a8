//! Strict binary envelope layout.
//!
//! ```text
//! ┌───────────────────────┬──────────┬──────┬──────────┬───────┐
//! │ version | kind        │ name len │ name │ seq id   │ value │
//! │ i32 BE (0x8001_00KK)  │ i32 BE   │ utf8 │ i32 BE   │ rest  │
//! └───────────────────────┴──────────┴──────┴──────────┴───────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::Codec;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{Result, RpcError};

/// Version marker in the high 16 bits of the first word.
pub const VERSION_1: u32 = 0x8001_0000;

const VERSION_MASK: u32 = 0xFFFF_0000;

/// The default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        let name_len = i32::try_from(envelope.name.len())
            .map_err(|_| RpcError::protocol("envelope name too long"))?;

        let mut buf = BytesMut::with_capacity(12 + envelope.name.len() + envelope.value.len());
        buf.put_u32(VERSION_1 | u32::from(envelope.kind as u8));
        buf.put_i32(name_len);
        buf.put_slice(envelope.name.as_bytes());
        buf.put_i32(envelope.seq_id);
        buf.put_slice(&envelope.value);
        Ok(buf.freeze())
    }

    fn decode_envelope(&self, data: Bytes) -> Result<Envelope> {
        let word = read_u32(&data, 0)?;
        if word & VERSION_MASK != VERSION_1 {
            return Err(RpcError::decode(format!(
                "missing envelope version marker: {word:#010x}"
            )));
        }
        let kind = EnvelopeKind::from_u8((word & 0xFF) as u8)
            .ok_or_else(|| RpcError::decode(format!("unknown envelope kind {}", word & 0xFF)))?;

        let name_len = read_u32(&data, 4)? as i32;
        let name_len = usize::try_from(name_len)
            .map_err(|_| RpcError::decode("negative envelope name length"))?;
        let name_end = 8usize
            .checked_add(name_len)
            .filter(|end| end + 4 <= data.len())
            .ok_or_else(|| RpcError::decode("truncated envelope"))?;

        let name = std::str::from_utf8(&data[8..name_end])
            .map_err(|_| RpcError::decode("envelope name is not valid UTF-8"))?
            .to_string();
        let seq_id = read_u32(&data, name_end)? as i32;

        Ok(Envelope {
            name,
            kind,
            seq_id,
            value: data.slice(name_end + 4..),
        })
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| RpcError::decode("truncated envelope"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_layout() {
        let envelope = Envelope::new("hi", EnvelopeKind::Reply, Bytes::from_static(b"x"));
        let bytes = BinaryCodec.encode_envelope(&envelope).unwrap();

        assert_eq!(&bytes[..4], &[0x80, 0x01, 0x00, 0x02]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 2]);
        assert_eq!(&bytes[8..10], b"hi");
        assert_eq!(&bytes[10..14], &[0, 0, 0, 1]);
        assert_eq!(&bytes[14..], b"x");
    }

    #[test]
    fn test_roundtrip_empty_value() {
        let envelope = Envelope::new("bar:hello", EnvelopeKind::Call, Bytes::new());
        let decoded = BinaryCodec
            .decode_envelope(BinaryCodec.encode_envelope(&envelope).unwrap())
            .unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_bare_payload_is_rejected() {
        let err = BinaryCodec
            .decode_envelope(Bytes::from_static(b"derp"))
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_truncated_name_is_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u32(VERSION_1 | 1);
        raw.put_i32(100);
        raw.put_slice(b"short");
        assert!(BinaryCodec.decode_envelope(raw.freeze()).is_err());
    }

    #[test]
    fn test_negative_name_length_is_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u32(VERSION_1 | 1);
        raw.put_i32(-1);
        raw.put_i32(1);
        assert!(BinaryCodec.decode_envelope(raw.freeze()).is_err());
    }
}
