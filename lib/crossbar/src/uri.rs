use std::fmt;

use crate::error::{Error, Result};

const TCP_PREFIX: &str = "tcp://";
const LOCAL_PREFIX: &str = "local://";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UriKind {
    Tcp,
    Local,
}

/// Encoded transport endpoint: `tcp://host:port` or `local://path`.
///
/// Deliberately minimal, nothing close to RFC 3986: scheme, then host:port
/// or a filesystem path. Anything after the first `?` is opaque and
/// preserved verbatim in the encoded form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Uri {
    kind: UriKind,
    host: String,
    port: u16,
    path: String,
    repr: String,
}

impl Uri {
    pub fn parse(uri: &str) -> Result<Uri> {
        if let Some(rest) = strip_prefix(uri, TCP_PREFIX) {
            let core = rest.splitn(2, '?').next().unwrap_or("");

            // The port separator is the last colon, so bracketed IPv6
            // literals parse without special casing.
            let sep = core
                .rfind(':')
                .ok_or_else(|| Error::InvalidUri(format!("missing port in '{}'", uri)))?;

            let host = &core[..sep];
            let port_str = &core[sep + 1..];

            if host.is_empty() {
                return Err(Error::InvalidUri(format!("empty host in '{}'", uri)));
            }

            let port: u16 = port_str
                .parse()
                .map_err(|_| Error::InvalidUri(format!("invalid port in '{}'", uri)))?;

            Ok(Uri {
                kind: UriKind::Tcp,
                host: host.to_string(),
                port,
                path: String::new(),
                repr: uri.to_string(),
            })
        } else if let Some(rest) = strip_prefix(uri, LOCAL_PREFIX) {
            let path = rest.splitn(2, '?').next().unwrap_or("");

            if path.is_empty() {
                return Err(Error::InvalidUri(format!("empty path in '{}'", uri)));
            }

            Ok(Uri {
                kind: UriKind::Local,
                host: String::new(),
                port: 0,
                path: path.to_string(),
                repr: uri.to_string(),
            })
        } else {
            Err(Error::InvalidUri(format!("unknown URI scheme in '{}'", uri)))
        }
    }

    pub fn tcp(host: &str, port: u16) -> Uri {
        Uri {
            kind: UriKind::Tcp,
            host: host.to_string(),
            port,
            path: String::new(),
            repr: format!("{}{}:{}", TCP_PREFIX, host, port),
        }
    }

    pub fn local(path: &str) -> Uri {
        Uri {
            kind: UriKind::Local,
            host: String::new(),
            port: 0,
            path: path.to_string(),
            repr: format!("{}{}", LOCAL_PREFIX, path),
        }
    }

    /// Formats a socket address as a URI, bracketing IPv6 literals.
    pub fn from_socket_addr(addr: std::net::SocketAddr) -> Uri {
        match addr {
            std::net::SocketAddr::V4(v4) => Uri::tcp(&v4.ip().to_string(), v4.port()),
            std::net::SocketAddr::V6(v6) => Uri::tcp(&format!("[{}]", v6.ip()), v6.port()),
        }
    }

    #[inline]
    pub fn kind(&self) -> UriKind {
        self.kind
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full encoded form, including any opaque `?` suffix.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

fn strip_prefix<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.starts_with(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let uri = Uri::parse("tcp://localhost:8500").unwrap();
        assert_eq!(uri.kind(), UriKind::Tcp);
        assert_eq!(uri.host(), "localhost");
        assert_eq!(uri.port(), 8500);
        assert_eq!(uri.as_str(), "tcp://localhost:8500");
    }

    #[test]
    fn test_parse_ipv6() {
        let uri = Uri::parse("tcp://[::1]:42000").unwrap();
        assert_eq!(uri.host(), "[::1]");
        assert_eq!(uri.port(), 42000);
    }

    #[test]
    fn test_parse_local() {
        let uri = Uri::parse("local:///tmp/NodeA3f.xbar").unwrap();
        assert_eq!(uri.kind(), UriKind::Local);
        assert_eq!(uri.path(), "/tmp/NodeA3f.xbar");
    }

    #[test]
    fn test_query_is_opaque() {
        let uri = Uri::parse("tcp://host:1234?keepalive=1").unwrap();
        assert_eq!(uri.host(), "host");
        assert_eq!(uri.port(), 1234);
        assert_eq!(uri.as_str(), "tcp://host:1234?keepalive=1");
    }

    #[test]
    fn test_invalid_uris() {
        assert!(matches!(Uri::parse("tcp://host"), Err(Error::InvalidUri(_))));
        assert!(matches!(Uri::parse("tcp://:8500"), Err(Error::InvalidUri(_))));
        assert!(matches!(Uri::parse("tcp://host:notaport"), Err(Error::InvalidUri(_))));
        assert!(matches!(Uri::parse("local://"), Err(Error::InvalidUri(_))));
        assert!(matches!(Uri::parse("http://host:80"), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_constructors_roundtrip() {
        let tcp = Uri::tcp("127.0.0.1", 9000);
        assert_eq!(Uri::parse(tcp.as_str()).unwrap(), tcp);

        let local = Uri::local("/tmp/reg.xbar");
        assert_eq!(Uri::parse(local.as_str()).unwrap(), local);
    }

    #[test]
    fn test_from_socket_addr() {
        let v4: std::net::SocketAddr = "127.0.0.1:8500".parse().unwrap();
        assert_eq!(Uri::from_socket_addr(v4).as_str(), "tcp://127.0.0.1:8500");

        let v6: std::net::SocketAddr = "[::1]:8500".parse().unwrap();
        assert_eq!(Uri::from_socket_addr(v6).as_str(), "tcp://[::1]:8500");
    }
}
