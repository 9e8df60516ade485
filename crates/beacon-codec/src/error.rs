use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("identity required to produce a v2 envelope")]
    MissingIdentity,
}

pub type CodecResult<T> = Result<T, CodecError>;
