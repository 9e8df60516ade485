use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("host is required")]
    MissingHost,

    #[error("port must be 1..65535")]
    InvalidPort,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("request timed out")]
    Timeout,
}

pub type TransportResult<T> = Result<T, TransportError>;
