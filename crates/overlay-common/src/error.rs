//! Shared error type for the overlay router and RDT cores.

use thiserror::Error;

/// Errors surfaced by packet codecs, the substrate abstraction, and the
/// routing/forwarding layers built on top of them.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("packet too short: need at least {need} bytes, got {got}")]
    PacketTooShort { need: usize, got: usize },

    #[error("payload length {declared} exceeds buffer remainder {remaining}")]
    PayloadLengthMismatch { declared: usize, remaining: usize },

    #[error("payload is not valid UTF-8")]
    InvalidPayloadEncoding,

    #[error("unknown protocol byte {0}")]
    UnknownProtocol(u8),

    #[error("malformed IP literal: {0:?}")]
    InvalidIp(String),

    #[error("malformed prefix literal: {0:?}")]
    InvalidPrefix(String),

    #[error("prefix length {0} exceeds 32 bits")]
    PrefixLengthOutOfRange(u8),

    #[error("substrate I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("substrate link {0} not ready")]
    LinkNotReady(usize),
}

pub type Result<T> = std::result::Result<T, OverlayError>;
