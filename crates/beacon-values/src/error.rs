use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuesError {
    #[error("principle name cannot be empty")]
    EmptyPrincipleName,

    #[error("boundary text cannot be empty")]
    EmptyBoundaryText,

    #[error(transparent)]
    Storage(#[from] beacon_storage::StorageError),
}

pub type ValuesResult<T> = std::result::Result<T, ValuesError>;
