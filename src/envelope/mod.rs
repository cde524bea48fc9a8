//! Envelope protocol.
//!
//! When enveloping is on (the default), every body is wrapped in an
//! [`Envelope`] naming the method and the message kind, so it can be decoded
//! without out-of-band context. When it is off, the body travels bare and the
//! procedure is known only from the transport metadata.
//!
//! With multiplexing, the envelope name is qualified as `service:procedure`
//! so one listener can serve several services that share procedure names.
//!
//! [`Framing`] applies both toggles in each direction.

mod framing;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use framing::{Framing, RequestMessage, ResponseMessage};

/// Separator between service and procedure in a multiplexed name.
pub const SERVICE_SEPARATOR: char = ':';

/// Sequence ID written into every envelope. Requests are correlated by the
/// transport, so the value is informational only.
pub const DEFAULT_SEQ_ID: i32 = 1;

/// Message kind carried in the envelope header.
///
/// `OneWay` is decoded so it can be refused by name; every call served here
/// gets a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeKind {
    Call = 1,
    Reply = 2,
    Exception = 3,
    OneWay = 4,
}

impl EnvelopeKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EnvelopeKind::Call),
            2 => Some(EnvelopeKind::Reply),
            3 => Some(EnvelopeKind::Exception),
            4 => Some(EnvelopeKind::OneWay),
            _ => None,
        }
    }
}

/// Method name and kind wrapped around a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub kind: EnvelopeKind,
    pub seq_id: i32,
    pub value: Bytes,
}

impl Envelope {
    pub fn new(name: impl Into<String>, kind: EnvelopeKind, value: Bytes) -> Self {
        Self {
            name: name.into(),
            kind,
            seq_id: DEFAULT_SEQ_ID,
            value,
        }
    }
}

/// `service:procedure`.
pub fn qualify(service: &str, procedure: &str) -> String {
    format!("{service}{SERVICE_SEPARATOR}{procedure}")
}

/// Split a multiplexed name into `(service, procedure)`.
///
/// Returns `None` when the name carries no qualifier.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(SERVICE_SEPARATOR)
}
