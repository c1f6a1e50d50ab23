use thiserror::Error;

#[derive(Debug, Error)]
pub enum RdtError {
    #[error("packet too short: need at least {need} bytes, got {got}")]
    PacketTooShort { need: usize, got: usize },
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("declared payload length {declared} exceeds remaining {remaining} bytes")]
    PayloadLengthMismatch { declared: usize, remaining: usize },
    #[error("window size {0} exceeds the maximum of {1}")]
    WindowTooLarge(u16, u16),
    #[error(transparent)]
    Substrate(#[from] overlay_common::OverlayError),
}

pub type Result<T> = std::result::Result<T, RdtError>;
