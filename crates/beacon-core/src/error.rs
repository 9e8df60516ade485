//! Shared error type for Beacon components.
//!
//! Mirrors the fail-closed discipline of the upstream core: recoverable
//! conditions get their own variant so callers can match on them instead
//! of string-sniffing a message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("duplicate commitment: {0}")]
    DuplicateCommitment(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
