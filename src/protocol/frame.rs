//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame: header, metadata block and body.
//! Uses `bytes::Bytes` so metadata and body share the read buffer.
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{kind, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(kind::RESPONSE, 0, 42, Bytes::new(), Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.request_id(), 42);
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{kind, Header, HEADER_SIZE};
use crate::error::{Result, RpcError};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Transport metadata (see [`RequestMeta`](super::RequestMeta) and
    /// [`ResponseMeta`](super::ResponseMeta)).
    pub meta: Bytes,
    /// Body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame, deriving the header lengths from the parts.
    ///
    /// The parts must fit the peer's payload limit. Frames built from
    /// caller-supplied data go through [`Frame::bounded`] instead.
    pub fn new(kind: u8, flags: u8, request_id: u32, meta: Bytes, body: Bytes) -> Self {
        let header = Header::new(
            kind,
            flags,
            request_id,
            meta.len() as u32,
            body.len() as u32,
        );
        Self { header, meta, body }
    }

    /// Like [`Frame::new`], but refuses a frame whose metadata plus body
    /// exceed `max_payload_size`, so it is never put on the wire.
    pub fn bounded(
        kind: u8,
        flags: u8,
        request_id: u32,
        meta: Bytes,
        body: Bytes,
        max_payload_size: u32,
    ) -> Result<Self> {
        let payload = meta.len() as u64 + body.len() as u64;
        if payload > u64::from(max_payload_size) {
            return Err(RpcError::protocol(format!(
                "payload size {payload} exceeds maximum {max_payload_size}"
            )));
        }
        Ok(Self::new(kind, flags, request_id, meta, body))
    }

    /// Create a cancel frame for the given request.
    pub fn cancel(request_id: u32) -> Self {
        Self::new(kind::CANCEL, 0, request_id, Bytes::new(), Bytes::new())
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.meta.len() + self.body.len()
    }

    /// Encode the whole frame into one contiguous buffer.
    ///
    /// The writer task uses scatter/gather I/O instead; this is for tests
    /// and one-off writes.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.meta);
        buf.extend_from_slice(&self.body);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_frame_creation_sets_lengths() {
        let frame = Frame::new(
            kind::REQUEST,
            flags::ENVELOPED,
            7,
            Bytes::from_static(b"meta"),
            Bytes::from_static(b"hello"),
        );

        assert_eq!(frame.header.meta_length, 4);
        assert_eq!(frame.header.body_length, 5);
        assert_eq!(frame.request_id(), 7);
        assert_eq!(frame.flags(), flags::ENVELOPED);
        assert_eq!(frame.size(), HEADER_SIZE + 9);
    }

    #[test]
    fn test_bounded_rejects_oversized_payload() {
        let meta = Bytes::from_static(b"meta");
        let frame = Frame::bounded(kind::REQUEST, 0, 1, meta.clone(), Bytes::from(vec![0u8; 6]), 10)
            .unwrap();
        assert_eq!(frame.header.payload_length(), 10);

        let err = Frame::bounded(kind::REQUEST, 0, 1, meta, Bytes::from(vec![0u8; 7]), 10)
            .unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[test]
    fn test_cancel_frame_is_empty() {
        let frame = Frame::cancel(12);
        assert!(frame.header.is_cancel());
        assert!(frame.meta.is_empty());
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_to_vec_layout() {
        let frame = Frame::new(
            kind::RESPONSE,
            0,
            1,
            Bytes::from_static(b"ab"),
            Bytes::from_static(b"cd"),
        );
        let bytes = frame.to_vec();
        assert_eq!(bytes.len(), HEADER_SIZE + 4);
        assert_eq!(&bytes[HEADER_SIZE..], b"abcd");
    }
}
