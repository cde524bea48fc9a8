//! Per-call request and response values.

use bytes::Bytes;

use super::Headers;
use crate::error::{Result, RpcError};

/// Well-known encoding names.
pub mod encoding {
    /// Opaque bytes, no application codec.
    pub const RAW: &str = "raw";
    /// Thrift-style structured payloads.
    pub const THRIFT: &str = "thrift";
    pub const JSON: &str = "json";
    pub const MSGPACK: &str = "msgpack";
}

/// A single call.
///
/// The body is owned by the request and handed to exactly one consumer:
/// moving it out consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Name of the calling service.
    pub caller: String,
    /// Name of the service being called.
    pub service: String,
    /// Procedure within `service`.
    pub procedure: String,
    /// Encoding of `body`, e.g. [`encoding::RAW`].
    pub encoding: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Create a raw-encoded request with an empty body.
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        procedure: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.into(),
            service: service.into(),
            procedure: procedure.into(),
            encoding: encoding::RAW.to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Check that all routing fields are populated.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("caller", &self.caller),
            ("service", &self.service),
            ("procedure", &self.procedure),
            ("encoding", &self.encoding),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RpcError::protocol(format!(
                "missing {} in request",
                missing.join(", ")
            )))
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub headers: Headers,
    pub body: Bytes,
    /// The body describes a handler-reported business error rather than a
    /// result. Transport and protocol failures never set this; they are
    /// returned as `Err`.
    pub application_error: bool,
}

impl Response {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: Headers::new(),
            body: body.into(),
            application_error: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A response flagged as a business error.
    pub fn application_error(body: impl Into<Bytes>) -> Self {
        Self {
            application_error: true,
            ..Self::new(body)
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Fold the application-error flag into a `Result`.
    pub fn into_result(self) -> Result<Response> {
        if self.application_error {
            Err(RpcError::Application(
                String::from_utf8_lossy(&self.body).into_owned(),
            ))
        } else {
            Ok(self)
        }
    }
}
