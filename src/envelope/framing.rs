//! Translation between [`Request`]/[`Response`] and transport messages.
//!
//! # Example
//!
//! ```
//! use rpcwire::envelope::Framing;
//! use rpcwire::options::{ClientConfig, Multiplexed, RegisterConfig};
//! use rpcwire::transport::Request;
//!
//! let client = Framing::for_client(&ClientConfig::from_options(&[&Multiplexed]));
//! let message = client.encode_request(Request::new("foo", "bar", "hello")).unwrap();
//!
//! let handler = Framing::for_handler(&RegisterConfig::default(), message.is_multiplexed());
//! let request = handler.decode_request(message).unwrap();
//! assert_eq!(request.procedure, "hello");
//! ```

use std::sync::Arc;

use bytes::Bytes;

use super::{qualify, split_qualified, Envelope, EnvelopeKind};
use crate::codec::Codec;
use crate::error::{Result, RpcError};
use crate::options::{ClientConfig, RegisterConfig};
use crate::protocol::{flags, kind, Frame, RequestMeta, ResponseMeta, Status};
use crate::transport::{Headers, Request, Response};

/// A request as it travels between outbound and inbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub flags: u8,
    pub meta: RequestMeta,
    pub body: Bytes,
}

impl RequestMessage {
    /// Frame for the wire, refused when larger than `max_payload_size`.
    pub fn into_frame(self, request_id: u32, max_payload_size: u32) -> Result<Frame> {
        Frame::bounded(
            kind::REQUEST,
            self.flags,
            request_id,
            self.meta.encode()?,
            self.body,
            max_payload_size,
        )
    }

    pub fn from_frame(frame: Frame) -> Result<Self> {
        Ok(Self {
            flags: frame.header.flags,
            meta: RequestMeta::decode(&frame.meta)?,
            body: frame.body,
        })
    }

    pub fn is_enveloped(&self) -> bool {
        flags::has_flag(self.flags, flags::ENVELOPED)
    }

    pub fn is_multiplexed(&self) -> bool {
        flags::has_flag(self.flags, flags::MULTIPLEXED)
    }
}

/// A response as it travels between inbound and outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub flags: u8,
    pub meta: ResponseMeta,
    pub body: Bytes,
}

impl ResponseMessage {
    /// A failed response with no body.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self {
            flags: 0,
            meta: ResponseMeta::failure(status, message),
            body: Bytes::new(),
        }
    }

    /// A failed response describing `err`.
    pub fn from_error(err: &RpcError) -> Self {
        Self::failure(err.status(), err.to_string())
    }

    /// A successful response that bypasses envelope framing.
    pub fn raw(body: Bytes) -> Self {
        Self {
            flags: 0,
            meta: ResponseMeta::ok(Headers::new()),
            body,
        }
    }

    /// Frame for the wire, refused when larger than `max_payload_size`.
    pub fn into_frame(self, request_id: u32, max_payload_size: u32) -> Result<Frame> {
        Frame::bounded(
            kind::RESPONSE,
            self.flags,
            request_id,
            self.meta.encode()?,
            self.body,
            max_payload_size,
        )
    }

    pub fn from_frame(frame: Frame) -> Result<Self> {
        Ok(Self {
            flags: frame.header.flags,
            meta: ResponseMeta::decode(&frame.meta)?,
            body: frame.body,
        })
    }
}

/// Enveloping and multiplexing settings for one side of a call.
///
/// The client side derives them from its [`ClientConfig`]. The handler side
/// takes enveloping from its [`RegisterConfig`] and multiplexing from the
/// incoming request's flags, since the caller decides how it names things.
#[derive(Debug, Clone)]
pub struct Framing {
    codec: Arc<dyn Codec>,
    enveloped: bool,
    multiplexed: bool,
}

impl Framing {
    pub fn new(codec: Arc<dyn Codec>, enveloped: bool, multiplexed: bool) -> Self {
        Self {
            codec,
            enveloped,
            multiplexed,
        }
    }

    pub fn for_client(config: &ClientConfig) -> Self {
        Self::new(
            Arc::clone(&config.protocol),
            !config.disable_enveloping,
            config.multiplexed,
        )
    }

    pub fn for_handler(config: &RegisterConfig, multiplexed: bool) -> Self {
        Self::new(
            Arc::clone(&config.protocol),
            !config.disable_enveloping,
            multiplexed,
        )
    }

    pub fn is_enveloped(&self) -> bool {
        self.enveloped
    }

    pub fn is_multiplexed(&self) -> bool {
        self.multiplexed
    }

    /// Name written into (and expected from) envelopes.
    pub fn envelope_name(&self, service: &str, procedure: &str) -> String {
        if self.multiplexed {
            qualify(service, procedure)
        } else {
            procedure.to_string()
        }
    }

    fn flags(&self) -> u8 {
        let mut bits = 0;
        if self.enveloped {
            bits |= flags::ENVELOPED;
        }
        if self.multiplexed {
            bits |= flags::MULTIPLEXED;
        }
        bits
    }

    fn check_enveloping(&self, message_flags: u8) -> Result<()> {
        let sent = flags::has_flag(message_flags, flags::ENVELOPED);
        match (sent, self.enveloped) {
            (true, false) => Err(RpcError::protocol(
                "received an enveloped body but enveloping is disabled",
            )),
            (false, true) => Err(RpcError::protocol(
                "received a bare body but enveloping is enabled",
            )),
            _ => Ok(()),
        }
    }

    fn check_name(&self, found: &str, service: &str, procedure: &str) -> Result<()> {
        let qualified = split_qualified(found);
        let matches = if self.multiplexed {
            qualified == Some((service, procedure))
        } else {
            found == procedure
        };
        if matches {
            return Ok(());
        }

        match qualified {
            Some((found_service, _)) if !self.multiplexed => Err(RpcError::decode(format!(
                "envelope name {found:?} is qualified with service {found_service:?} \
                 but the call is not multiplexed"
            ))),
            _ => Err(RpcError::decode(format!(
                "envelope name {found:?} does not match {:?}",
                self.envelope_name(service, procedure)
            ))),
        }
    }

    /// Frame an outgoing request. The path and TTL are left for the
    /// transport to fill in.
    pub fn encode_request(&self, request: Request) -> Result<RequestMessage> {
        request.validate()?;
        let Request {
            caller,
            service,
            procedure,
            encoding,
            headers,
            body,
        } = request;

        let body = if self.enveloped {
            let name = self.envelope_name(&service, &procedure);
            self.codec
                .encode_envelope(&Envelope::new(name, EnvelopeKind::Call, body))?
        } else {
            body
        };

        Ok(RequestMessage {
            flags: self.flags(),
            meta: RequestMeta {
                path: "/".to_string(),
                caller,
                service,
                procedure,
                encoding,
                ttl: None,
                headers,
            },
            body,
        })
    }

    /// Unframe an incoming request.
    pub fn decode_request(&self, message: RequestMessage) -> Result<Request> {
        self.check_enveloping(message.flags)?;
        let RequestMessage { meta, body, .. } = message;

        let body = if self.enveloped {
            let envelope = self.codec.decode_envelope(body)?;
            match envelope.kind {
                EnvelopeKind::Call => {}
                EnvelopeKind::OneWay => {
                    return Err(RpcError::decode("one-way calls are not supported"));
                }
                other => {
                    return Err(RpcError::decode(format!(
                        "expected a call envelope, got {other:?}"
                    )));
                }
            }
            self.check_name(&envelope.name, &meta.service, &meta.procedure)?;
            envelope.value
        } else {
            body
        };

        let request = Request {
            caller: meta.caller,
            service: meta.service,
            procedure: meta.procedure,
            encoding: meta.encoding,
            headers: meta.headers,
            body,
        };
        request.validate()?;
        Ok(request)
    }

    /// Frame a handler's response to `service`/`procedure`.
    pub fn encode_response(
        &self,
        service: &str,
        procedure: &str,
        response: Response,
    ) -> Result<ResponseMessage> {
        let Response {
            headers,
            body,
            application_error,
        } = response;

        let mut bits = self.flags();
        if application_error {
            bits |= flags::APPLICATION_ERROR;
        }

        let body = if self.enveloped {
            let kind = if application_error {
                EnvelopeKind::Exception
            } else {
                EnvelopeKind::Reply
            };
            let name = self.envelope_name(service, procedure);
            self.codec
                .encode_envelope(&Envelope::new(name, kind, body))?
        } else {
            body
        };

        Ok(ResponseMessage {
            flags: bits,
            meta: ResponseMeta::ok(headers),
            body,
        })
    }

    /// Unframe the response to a call of `service`/`procedure`.
    ///
    /// Failed statuses become [`RpcError::Remote`] before any envelope check,
    /// since failures are never enveloped.
    pub fn decode_response(
        &self,
        service: &str,
        procedure: &str,
        message: ResponseMessage,
    ) -> Result<Response> {
        let ResponseMessage { flags: bits, meta, body } = message;
        let headers = meta.headers.clone();
        if let Some(err) = meta.into_error() {
            return Err(err);
        }

        self.check_enveloping(bits)?;
        let application_error = flags::has_flag(bits, flags::APPLICATION_ERROR);

        let body = if self.enveloped {
            let envelope = self.codec.decode_envelope(body)?;
            let exception = match envelope.kind {
                EnvelopeKind::Reply => false,
                EnvelopeKind::Exception => true,
                other => {
                    return Err(RpcError::decode(format!(
                        "expected a reply envelope, got {other:?}"
                    )))
                }
            };
            if exception != application_error {
                return Err(RpcError::decode(
                    "envelope kind disagrees with the application error flag",
                ));
            }
            self.check_name(&envelope.name, service, procedure)?;
            envelope.value
        } else {
            body
        };

        Ok(Response {
            headers,
            body,
            application_error,
        })
    }
}
