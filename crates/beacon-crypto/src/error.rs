use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid keystore: {0}")]
    InvalidKeystore(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
