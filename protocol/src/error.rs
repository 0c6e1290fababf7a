use std::fmt;
use std::io;

use crate::packet_kind::PacketKind;

/// Protocol decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    PacketTooShort { expected: usize, got: usize },
    UnknownPacketKind(u8),
    InvalidUtf8,
    IncompletePayload { expected: usize, got: usize },
    PayloadTooLarge { limit: usize, got: usize },
    UnexpectedKind { expected: PacketKind, got: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::PacketTooShort { expected, got } => {
                write!(f, "packet too short: expected at least {expected} bytes, got {got}")
            }
            ProtocolError::UnknownPacketKind(kind) => {
                write!(f, "unknown packet kind: 0x{kind:02x}")
            }
            ProtocolError::InvalidUtf8 => {
                write!(f, "invalid UTF-8 encoding")
            }
            ProtocolError::IncompletePayload { expected, got } => {
                write!(f, "incomplete payload: expected {expected} bytes, got {got}")
            }
            ProtocolError::PayloadTooLarge { limit, got } => {
                write!(f, "payload of {got} bytes exceeds limit of {limit} bytes")
            }
            ProtocolError::UnexpectedKind { expected, got } => {
                write!(f, "unexpected packet kind: expected {expected:?}, got 0x{got:02x}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors raised while reading or writing packets on a stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream before a complete packet arrived.
    #[error("connection closed")]
    Eof,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl StreamError {
    /// Folds `UnexpectedEof` into [`StreamError::Eof`] so callers see one closure variant.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StreamError::Eof
        } else {
            StreamError::Io(err)
        }
    }

    /// True when the error means the connection is gone rather than misbehaving.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            StreamError::Eof => true,
            StreamError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            StreamError::Protocol(_) => false,
        }
    }
}
