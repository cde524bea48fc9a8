//! Reassembly of frames from a byte stream.
//!
//! Socket reads rarely line up with frame boundaries. [`FrameBuffer`] keeps
//! the unconsumed tail in one `BytesMut` and hands out metadata and bodies as
//! frozen slices of it, so nothing is copied twice.
//!
//! ```
//! use bytes::Bytes;
//! use rpcwire::protocol::{kind, Frame, FrameBuffer};
//!
//! let bytes = Frame::new(kind::REQUEST, 0, 7, Bytes::new(), Bytes::from_static(b"hi")).to_vec();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&bytes[..10]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[10..]).unwrap();
//! assert_eq!(frames[0].request_id(), 7);
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    /// Header consumed and validated; `meta_length + body_length` bytes to go.
    WaitingForPayload { header: Header },
}

/// Incremental frame decoder for one connection.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Buffer bounded by [`DEFAULT_MAX_PAYLOAD_SIZE`].
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Buffer rejecting frames whose metadata plus body exceed
    /// `max_payload_size`.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Append a read and drain every frame it completes.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a header fails validation. The stream is
    /// unrecoverable after that and the connection should be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    header.validate(self.max_payload_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let header = *header;
                    let meta_len = header.meta_length as usize;
                    let body_len = header.body_length as usize;

                    if self.buffer.len() < meta_len + body_len {
                        return Ok(None);
                    }

                    let meta = self.buffer.split_to(meta_len).freeze();
                    let body = self.buffer.split_to(body_len).freeze();
                    self.state = State::WaitingForHeader;

                    return Ok(Some(Frame { header, meta, body }));
                }
            }
        }
    }

    /// Bytes held for a frame not yet complete.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
