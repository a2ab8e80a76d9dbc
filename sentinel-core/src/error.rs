use thiserror::Error;

/// All errors produced by sentinel-core.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("device error: {0}")]
    Device(String),

    #[error("resource load error: {0}")]
    ResourceLoad(String),

    #[error("unsupported capability: {0}")]
    Unsupported(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("coordinator is already running")]
    AlreadyRunning,

    #[error("coordinator is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
