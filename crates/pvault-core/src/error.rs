use thiserror::Error;

pub type PvaultResult<T> = Result<T, PvaultError>;

#[derive(Debug, Error)]
pub enum PvaultError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
