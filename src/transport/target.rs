//! Outbound destination: network address plus inbound path.

use std::fmt;
use std::str::FromStr;

use crate::error::RpcError;

/// URL scheme accepted in front of a target.
pub const SCHEME: &str = "tcp://";

/// Where an outbound sends its calls.
///
/// Parsed from `host:port[/path]`, optionally prefixed with `tcp://`.
/// A missing path means `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub addr: String,
    pub path: String,
}

impl Target {
    pub fn new(addr: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            addr: addr.into(),
            path: if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            },
        }
    }
}

impl FromStr for Target {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(SCHEME).unwrap_or(s);
        let (addr, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if addr.is_empty() || !addr.contains(':') {
            return Err(RpcError::InvalidTarget(s.to_string()));
        }
        Ok(Target::new(addr, path))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{}", self.addr, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_scheme_and_path() {
        let target: Target = "tcp://127.0.0.1:4040/rpc/v1".parse().unwrap();
        assert_eq!(target.addr, "127.0.0.1:4040");
        assert_eq!(target.path, "/rpc/v1");
    }

    #[test]
    fn test_parse_bare_address() {
        let target: Target = "localhost:80".parse().unwrap();
        assert_eq!(target.addr, "localhost:80");
        assert_eq!(target.path, "/");
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!("tcp:///rpc".parse::<Target>().is_err());
        assert!("localhost".parse::<Target>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let target = Target::new("127.0.0.1:1", "health");
        assert_eq!(target.to_string(), "tcp://127.0.0.1:1/health");
        assert_eq!(target.to_string().parse::<Target>().unwrap(), target);
    }
}
