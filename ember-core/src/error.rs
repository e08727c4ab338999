//! Domain-specific error types for the Ember Link protocol.
//!
//! All fallible operations return `Result<T, EmberError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the Ember Link client.
#[derive(Debug, Error)]
pub enum EmberError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The received frame does not follow the plaintext layout.
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// A numeric value did not map to any known message kind.
    #[error("unknown message kind: {value:#x}")]
    UnknownKind { value: u64 },

    /// A message or transition violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The frame payload exceeds the configured maximum size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A protocol API call failed (send on a closed or broken link).
    #[error("protocol API error: {0}")]
    Api(String),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EmberError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        EmberError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for EmberError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EmberError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = EmberError::UnknownKind { value: 0xBEEF };
        assert!(e.to_string().contains("0xbeef"));

        let e = EmberError::FrameTooLarge {
            size: 100_000,
            max: 65_536,
        };
        assert!(e.to_string().contains("100000"));
        assert!(e.to_string().contains("65536"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: EmberError = io_err.into();
        assert!(matches!(e, EmberError::Connection(_)));
    }

    #[test]
    fn from_bincode() {
        let res: Result<u32, _> = bincode::deserialize(&[]);
        let e: EmberError = res.unwrap_err().into();
        assert!(matches!(e, EmberError::Encoding(_)));
    }
}
