//! Error types for rpcwire.
//!
//! Every failure is returned as an [`RpcError`]. [`RpcError::kind`] folds the
//! variants into the coarse [`ErrorKind`] taxonomy callers branch on, and
//! [`RpcError::status`] picks the [`Status`] an inbound reports to its peer.

use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::Status;

/// Coarse classification of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bind failures, refused connections, socket-level failures.
    Network,
    /// Malformed frames or envelopes, enveloping/multiplexing mismatches,
    /// unsupported encodings.
    Protocol,
    /// Unknown service or procedure.
    Routing,
    /// The peer cannot serve right now (no registry, capacity exhausted).
    Unavailable,
    /// Handler-reported business failure.
    Application,
    /// Deadline exceeded or explicit cancellation.
    Cancelled,
    /// Lifecycle misuse: calling before `start`, after `stop`, double start.
    NotReady,
    /// Broken internal invariant, scoped to one request.
    Internal,
}

/// Main error type for all rpcwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Outbound connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Outbound target could not be parsed.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    /// Connection closed while a call was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Writer queue stayed full past the backpressure timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Protocol error (invalid frame, wrong flags, mismatched framing).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A payload could not be decoded by the selected codec.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// No handler registered for the (service, procedure) pair.
    #[error("no handler for procedure {procedure:?} of service {service:?}")]
    RouteNotFound { service: String, procedure: String },

    /// The chosen handler does not accept the request's encoding.
    #[error("procedure {procedure:?} of service {service:?} does not accept encoding {encoding:?}")]
    UnsupportedEncoding {
        service: String,
        procedure: String,
        encoding: String,
    },

    /// A request arrived before a registry was attached to the inbound.
    #[error("no registry attached to inbound")]
    RoutingUnavailable,

    /// Business failure reported by a handler.
    #[error("{0}")]
    Application(String),

    /// The call's context was cancelled.
    #[error("call cancelled")]
    Cancelled,

    /// The call's deadline passed before a response arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Operation not valid in the current lifecycle state.
    #[error("{0} is not ready")]
    NotReady(&'static str),

    /// `start` called on an inbound that is already serving.
    #[error("inbound already started on {0}")]
    AlreadyStarted(SocketAddr),

    /// Failure reported by the peer.
    #[error("{message}")]
    Remote { status: Status, message: String },

    /// Broken invariant inside a single request or connection.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Shorthand for [`RpcError::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        RpcError::Protocol(message.into())
    }

    /// Shorthand for [`RpcError::Decode`].
    pub fn decode(message: impl Into<String>) -> Self {
        RpcError::Decode(message.into())
    }

    /// Shorthand for [`RpcError::Application`].
    pub fn application(message: impl Into<String>) -> Self {
        RpcError::Application(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Io(_)
            | RpcError::Bind { .. }
            | RpcError::Connect { .. }
            | RpcError::InvalidTarget(_)
            | RpcError::ConnectionClosed
            | RpcError::BackpressureTimeout => ErrorKind::Network,
            RpcError::Protocol(_)
            | RpcError::Decode(_)
            | RpcError::Json(_)
            | RpcError::MsgPackEncode(_)
            | RpcError::MsgPackDecode(_)
            | RpcError::UnsupportedEncoding { .. } => ErrorKind::Protocol,
            RpcError::RouteNotFound { .. } => ErrorKind::Routing,
            RpcError::RoutingUnavailable => ErrorKind::Unavailable,
            RpcError::Application(_) => ErrorKind::Application,
            RpcError::Cancelled | RpcError::DeadlineExceeded => ErrorKind::Cancelled,
            RpcError::NotReady(_) | RpcError::AlreadyStarted(_) => ErrorKind::NotReady,
            RpcError::Remote { status, .. } => status.kind(),
            RpcError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Status an inbound sends back when this error fails a request.
    pub fn status(&self) -> Status {
        match self {
            RpcError::RouteNotFound { .. } => Status::NotFound,
            RpcError::UnsupportedEncoding { .. } => Status::UnsupportedEncoding,
            RpcError::Protocol(_)
            | RpcError::Decode(_)
            | RpcError::Json(_)
            | RpcError::MsgPackEncode(_)
            | RpcError::MsgPackDecode(_) => Status::BadRequest,
            RpcError::RoutingUnavailable | RpcError::BackpressureTimeout => Status::Unavailable,
            RpcError::DeadlineExceeded => Status::Timeout,
            RpcError::Cancelled => Status::Cancelled,
            RpcError::Remote { status, .. } => *status,
            _ => Status::Internal,
        }
    }

    /// Whether the bind or connect failure was caused by an address in use.
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            RpcError::Bind { source, .. } | RpcError::Connect { source, .. } => {
                source.kind() == std::io::ErrorKind::AddrInUse
            }
            _ => false,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_and_encoding_errors_are_distinct_kinds() {
        let missing = RpcError::RouteNotFound {
            service: "bar".into(),
            procedure: "goodbye".into(),
        };
        let mismatch = RpcError::UnsupportedEncoding {
            service: "bar".into(),
            procedure: "hello".into(),
            encoding: "json".into(),
        };

        assert_eq!(missing.kind(), ErrorKind::Routing);
        assert_eq!(mismatch.kind(), ErrorKind::Protocol);
        assert_eq!(missing.status(), Status::NotFound);
        assert_eq!(mismatch.status(), Status::UnsupportedEncoding);
    }

    #[test]
    fn test_remote_error_displays_peer_message() {
        let err = RpcError::Remote {
            status: Status::NotFound,
            message: "404 page not found".into(),
        };
        assert_eq!(err.to_string(), "404 page not found");
        assert_eq!(err.kind(), ErrorKind::Routing);
    }

    #[test]
    fn test_bind_error_keeps_source() {
        let err = RpcError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.is_addr_in_use());
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cancellation_kinds() {
        assert_eq!(RpcError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(RpcError::DeadlineExceeded.kind(), ErrorKind::Cancelled);
        assert_eq!(RpcError::DeadlineExceeded.status(), Status::Timeout);
    }
}
