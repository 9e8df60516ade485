use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgreementError {
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("invalid task transition: {from} -> {to}")]
    InvalidTaskTransition { from: String, to: String },

    #[error("accord {0} not found")]
    AccordNotFound(String),

    #[error("contract {0} not found")]
    ContractNotFound(String),
    #[error("invalid contract transition: {from} -> {to}")]
    InvalidContractTransition { from: String, to: String },
    #[error("invalid contract type: {0}")]
    InvalidContractType(String),
    #[error("price must be positive")]
    InvalidPrice,
    #[error("rent contracts require duration_days > 0")]
    RentRequiresDuration,
    #[error("lease-to-own not yet complete: {completed}/{total} periods")]
    LeaseNotComplete { completed: u32, total: u32 },
    #[error("escrow already released")]
    EscrowAlreadyReleased,
    #[error("no escrow for contract {0}")]
    NoEscrow(String),
    #[error("only buy/lease_to_own contracts support ownership transfer")]
    NotTransferable,

    #[error(transparent)]
    Storage(#[from] beacon_storage::StorageError),
}

pub type AgreementResult<T> = std::result::Result<T, AgreementError>;
