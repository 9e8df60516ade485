use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
