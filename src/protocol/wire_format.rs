//! Wire format encoding and decoding.
//!
//! Implements the 14-byte frame header:
//! ```text
//! ┌──────┬───────┬──────────┬──────────┬──────────┐
//! │ Kind │ Flags │ Req ID   │ Meta len │ Body len │
//! │ 1 B  │ 1 B   │ uint32 BE│ uint32 BE│ uint32 BE│
//! └──────┴───────┴──────────┴──────────┴──────────┘
//! ```
//!
//! The header is followed by `meta len` bytes of transport metadata and
//! `body len` bytes of (possibly enveloped) payload.

use crate::error::{Result, RpcError};

/// Header size in bytes (fixed, exactly 14).
pub const HEADER_SIZE: usize = 14;

/// Default maximum for metadata plus body (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Reserved request ID (never used on the wire).
pub const RESERVED_REQUEST_ID: u32 = 0;

/// Frame kinds.
pub mod kind {
    /// A call from an outbound to an inbound.
    pub const REQUEST: u8 = 1;
    /// The answer to a request with the same ID.
    pub const RESPONSE: u8 = 2;
    /// The caller gave up on the request with the same ID.
    pub const CANCEL: u8 = 3;
}

/// Flag constants for the protocol.
pub mod flags {
    /// Body is wrapped in a codec envelope.
    pub const ENVELOPED: u8 = 0b0000_0001;
    /// Envelope name is qualified as `service:procedure`.
    pub const MULTIPLEXED: u8 = 0b0000_0010;
    /// Response body carries a handler-reported business error.
    pub const APPLICATION_ERROR: u8 = 0b0000_0100;

    /// Reserved bits mask (bits 3-7).
    pub const RESERVED_MASK: u8 = 0b1111_1000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (see `kind` module).
    pub kind: u8,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Request identifier, unique per connection while in flight.
    pub request_id: u32,
    /// Metadata block length in bytes.
    pub meta_length: u32,
    /// Body length in bytes.
    pub body_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u8, flags: u8, request_id: u32, meta_length: u32, body_length: u32) -> Self {
        Self {
            kind,
            flags,
            request_id,
            meta_length,
            body_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use rpcwire::protocol::{kind, Header};
    ///
    /// let header = Header::new(kind::REQUEST, 0, 42, 10, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 14);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.request_id.to_be_bytes());
        buf[6..10].copy_from_slice(&self.meta_length.to_be_bytes());
        buf[10..14].copy_from_slice(&self.body_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: buf[0],
            flags: buf[1],
            request_id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            meta_length: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
            body_length: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
        })
    }

    /// Combined metadata and body length.
    #[inline]
    pub fn payload_length(&self) -> u64 {
        u64::from(self.meta_length) + u64::from(self.body_length)
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Kind is one of the known frame kinds
    /// - Request ID is not 0 (reserved)
    /// - Metadata plus body doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if !matches!(self.kind, kind::REQUEST | kind::RESPONSE | kind::CANCEL) {
            return Err(RpcError::protocol(format!(
                "unknown frame kind {}",
                self.kind
            )));
        }

        if self.request_id == RESERVED_REQUEST_ID {
            return Err(RpcError::protocol("request ID 0 is reserved"));
        }

        if self.payload_length() > u64::from(max_payload_size) {
            return Err(RpcError::protocol(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length(),
                max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(RpcError::protocol("reserved flag bits must be 0"));
        }

        Ok(())
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == kind::REQUEST
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == kind::RESPONSE
    }

    #[inline]
    pub fn is_cancel(&self) -> bool {
        self.kind == kind::CANCEL
    }

    #[inline]
    pub fn is_enveloped(&self) -> bool {
        flags::has_flag(self.flags, flags::ENVELOPED)
    }

    #[inline]
    pub fn is_multiplexed(&self) -> bool {
        flags::has_flag(self.flags, flags::MULTIPLEXED)
    }

    #[inline]
    pub fn is_application_error(&self) -> bool {
        flags::has_flag(self.flags, flags::APPLICATION_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(kind::RESPONSE, flags::ENVELOPED, 42, 7, 100);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x01, 0x02, 0x03040506, 0x0708090A, 0x0B0C0D0E);
        let bytes = header.encode();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(&bytes[2..6], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&bytes[6..10], &[0x07, 0x08, 0x09, 0x0A]);
        assert_eq!(&bytes[10..14], &[0x0B, 0x0C, 0x0D, 0x0E]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_request_id_zero_rejected() {
        let header = Header::new(kind::REQUEST, 0, 0, 0, 0);
        let err = header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(err.to_string().contains("request ID 0 is reserved"));
    }

    #[test]
    fn test_validate_unknown_kind() {
        let header = Header::new(9, 0, 1, 0, 0);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    fn test_validate_payload_counts_meta_and_body() {
        let header = Header::new(kind::REQUEST, 0, 1, 60, 60);
        assert!(header.validate(120).is_ok());
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(kind::REQUEST, 0b1000_0000, 1, 0, 0);
        let err = header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(err.to_string().contains("reserved flag bits"));
    }

    #[test]
    fn test_header_accessors() {
        let header = Header::new(
            kind::RESPONSE,
            flags::ENVELOPED | flags::APPLICATION_ERROR,
            3,
            0,
            0,
        );

        assert!(header.is_response());
        assert!(!header.is_request());
        assert!(!header.is_cancel());
        assert!(header.is_enveloped());
        assert!(header.is_application_error());
        assert!(!header.is_multiplexed());
    }

    #[test]
    fn test_payload_length_does_not_overflow() {
        let header = Header::new(kind::REQUEST, 0, 1, u32::MAX, u32::MAX);
        assert_eq!(header.payload_length(), 2 * u64::from(u32::MAX));
        assert!(header.validate(u32::MAX).is_err());
    }
}
