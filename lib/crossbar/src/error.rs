use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Invalid configuration detected at construction time.
    Configuration(String),
    /// Fatal protocol violation: unsupported version, malformed handshake,
    /// bad magic bytes or a timeout during the join sequence.
    Protocol(String),
    /// A decoder tried to read past the end of the available bytes.
    EndOfBuffer,
    /// API misuse, e.g. reading the sender endpoint of a subscription frame.
    InvalidOperation(&'static str),
    /// None of the remote peer's acceptors could be reached.
    ConnectionRefused(String),
    /// The transport to a peer went down.
    ConnectionLost,
    /// Targeted send to a participant that is not subscribed on the link.
    UnknownTarget(String),
    /// The peer's write queue exceeded the configured soft cap.
    Backpressure,
    /// Malformed transport URI.
    InvalidUri(String),
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::EndOfBuffer => write!(f, "decode ran past the end of the buffer"),
            Error::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
            Error::ConnectionRefused(target) => write!(f, "connection refused: {}", target),
            Error::ConnectionLost => write!(f, "connection lost"),
            Error::UnknownTarget(name) => write!(f, "unknown target participant: {}", name),
            Error::Backpressure => write!(f, "write queue exceeded its soft cap"),
            Error::InvalidUri(uri) => write!(f, "invalid URI: {}", uri),
            Error::Io(kind) => write!(f, "i/o error: {:?}", kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        Error::Io(io_error.kind())
    }
}
