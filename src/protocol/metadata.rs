//! Transport metadata carried between the frame header and the body.
//!
//! Requests carry routing metadata (path, caller, service, procedure,
//! encoding), the caller's remaining TTL and application headers. Responses
//! carry a [`Status`], a message for failed statuses and headers.
//!
//! ```text
//! request:  ttl_ms u32 | path | caller | service | procedure | encoding | headers
//! response: status u8  | message | headers
//! string:   len u16 BE | utf-8 bytes
//! headers:  count u16 BE | (key, value)*
//! ```

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ErrorKind, Result, RpcError};
use crate::transport::Headers;

/// Outcome of a request as reported by the inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// No RPC route or auxiliary route matched.
    NotFound = 1,
    /// The handler does not accept the request's encoding.
    UnsupportedEncoding = 2,
    /// Metadata or envelope could not be decoded.
    BadRequest = 3,
    /// No registry attached, handler capacity exhausted or shutting down.
    Unavailable = 4,
    /// The handler ran past the propagated TTL.
    Timeout = 5,
    /// The caller cancelled the request.
    Cancelled = 6,
    Internal = 7,
}

impl Status {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Status::Ok,
            1 => Status::NotFound,
            2 => Status::UnsupportedEncoding,
            3 => Status::BadRequest,
            4 => Status::Unavailable,
            5 => Status::Timeout,
            6 => Status::Cancelled,
            7 => Status::Internal,
            _ => return None,
        })
    }

    /// Error classification of a failed status.
    pub fn kind(self) -> ErrorKind {
        match self {
            Status::NotFound => ErrorKind::Routing,
            Status::UnsupportedEncoding | Status::BadRequest => ErrorKind::Protocol,
            Status::Unavailable => ErrorKind::Unavailable,
            Status::Timeout | Status::Cancelled => ErrorKind::Cancelled,
            Status::Ok | Status::Internal => ErrorKind::Internal,
        }
    }
}

/// Routing metadata of a request frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Inbound path the request is addressed to.
    pub path: String,
    pub caller: String,
    pub service: String,
    pub procedure: String,
    pub encoding: String,
    /// Remaining time the caller is willing to wait.
    pub ttl: Option<Duration>,
    pub headers: Headers,
}

impl RequestMeta {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        let ttl_ms = self
            .ttl
            .map(|ttl| ttl.as_millis().clamp(1, u128::from(u32::MAX)) as u32)
            .unwrap_or(0);
        buf.put_u32(ttl_ms);
        for field in [
            &self.path,
            &self.caller,
            &self.service,
            &self.procedure,
            &self.encoding,
        ] {
            put_str(&mut buf, field)?;
        }
        put_headers(&mut buf, &self.headers)?;
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = MetaReader::new(data);
        let ttl_ms = reader.u32()?;
        let meta = RequestMeta {
            ttl: (ttl_ms > 0).then(|| Duration::from_millis(u64::from(ttl_ms))),
            path: reader.string()?,
            caller: reader.string()?,
            service: reader.string()?,
            procedure: reader.string()?,
            encoding: reader.string()?,
            headers: reader.headers()?,
        };
        reader.finish()?;
        Ok(meta)
    }
}

/// Outcome metadata of a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: Status,
    pub message: String,
    pub headers: Headers,
}

impl ResponseMeta {
    pub fn ok(headers: Headers) -> Self {
        Self {
            status: Status::Ok,
            message: String::new(),
            headers,
        }
    }

    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: Headers::new(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(16 + self.message.len());
        buf.put_u8(self.status as u8);
        put_str(&mut buf, &self.message)?;
        put_headers(&mut buf, &self.headers)?;
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = MetaReader::new(data);
        let raw = reader.u8()?;
        let status = Status::from_u8(raw)
            .ok_or_else(|| RpcError::protocol(format!("unknown response status {raw}")))?;
        let meta = ResponseMeta {
            status,
            message: reader.string()?,
            headers: reader.headers()?,
        };
        reader.finish()?;
        Ok(meta)
    }

    /// Turn a failed status into the error the caller sees.
    pub fn into_error(self) -> Option<RpcError> {
        match self.status {
            Status::Ok => None,
            status => Some(RpcError::Remote {
                status,
                message: self.message,
            }),
        }
    }
}

fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| RpcError::protocol(format!("metadata field of {} bytes", value.len())))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_headers(buf: &mut BytesMut, headers: &Headers) -> Result<()> {
    let count = u16::try_from(headers.len())
        .map_err(|_| RpcError::protocol(format!("{} headers", headers.len())))?;
    buf.put_u16(count);
    for (key, value) in headers.iter() {
        put_str(buf, key)?;
        put_str(buf, value)?;
    }
    Ok(())
}

/// Bounds-checked cursor over a metadata block.
struct MetaReader<'a> {
    data: &'a [u8],
}

impl<'a> MetaReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(RpcError::protocol("truncated metadata"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| RpcError::protocol("metadata field is not valid UTF-8"))
    }

    fn headers(&mut self) -> Result<Headers> {
        let count = self.u16()?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let key = self.string()?;
            let value = self.string()?;
            headers.insert(key, value);
        }
        Ok(headers)
    }

    fn finish(self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(RpcError::protocol(format!(
                "{} trailing metadata bytes",
                self.data.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RequestMeta {
        RequestMeta {
            path: "/rpc/v1".into(),
            caller: "foo".into(),
            service: "bar".into(),
            procedure: "hello".into(),
            encoding: "raw".into(),
            ttl: Some(Duration::from_millis(1500)),
            headers: Headers::new().with("Trace-Id", "abc"),
        }
    }

    #[test]
    fn test_request_meta_roundtrip() {
        let meta = sample_request();
        let decoded = RequestMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.headers.get("trace-id"), Some("abc"));
    }

    #[test]
    fn test_request_meta_without_ttl() {
        let meta = RequestMeta {
            ttl: None,
            ..sample_request()
        };
        let decoded = RequestMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded.ttl, None);
    }

    #[test]
    fn test_sub_millisecond_ttl_is_not_dropped() {
        let meta = RequestMeta {
            ttl: Some(Duration::from_micros(10)),
            ..sample_request()
        };
        let decoded = RequestMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded.ttl, Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_truncated_request_meta() {
        let encoded = sample_request().encode().unwrap();
        let err = RequestMeta::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = sample_request().encode().unwrap().to_vec();
        encoded.push(0);
        assert!(RequestMeta::decode(&encoded).is_err());
    }

    #[test]
    fn test_response_meta_roundtrip() {
        let meta = ResponseMeta::failure(Status::NotFound, "404 page not found");
        let decoded = ResponseMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);

        let err = decoded.into_error().unwrap();
        assert_eq!(err.to_string(), "404 page not found");
    }

    #[test]
    fn test_ok_response_is_not_an_error() {
        let meta = ResponseMeta::ok(Headers::new());
        assert!(meta.into_error().is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut encoded = ResponseMeta::ok(Headers::new()).encode().unwrap().to_vec();
        encoded[0] = 200;
        assert!(ResponseMeta::decode(&encoded).is_err());
    }

    #[test]
    fn test_oversized_field_rejected() {
        let meta = RequestMeta {
            caller: "x".repeat(usize::from(u16::MAX) + 1),
            ..sample_request()
        };
        assert!(meta.encode().is_err());
    }
}
