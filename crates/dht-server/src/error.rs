use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error(transparent)]
    Wire(#[from] crate::wire::WireError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid node address '{0}'")]
    InvalidAddress(String),
    #[error("cfg file '{0}' is empty or malformed")]
    InvalidCfgFile(String),
}

pub type Result<T> = std::result::Result<T, DhtError>;
