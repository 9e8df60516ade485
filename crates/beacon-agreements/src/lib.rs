//! Beacon Agreements - event-sourced state machines for the three ways
//! two agents commit to each other: a [`task`] (bounty lifecycle), an
//! [`accord`] (anti-sycophancy bond with pushback rights), and a
//! [`contract`] (property rent/buy/lease-to-own with escrow).

pub mod accord;
pub mod contract;
pub mod error;
pub mod task;

pub use accord::{Accord, AccordEvent, AccordManager, AccordState, PushbackRecommendation, Role};
pub use contract::{Contract, ContractEvent, ContractEventKind, ContractManager, ContractState, ContractType, Escrow, LeaseToOwn};
pub use error::{AgreementError, AgreementResult};
pub use task::{Task, TaskEvent, TaskManager, TaskState};
