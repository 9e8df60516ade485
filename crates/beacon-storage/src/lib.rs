//! Beacon Storage - append-only logs and atomic snapshots
//!
//! Every durable record in Beacon lives under one per-agent data
//! directory, addressed by file name. This crate is the only thing that
//! touches that directory; it knows nothing about what it stores.

pub mod error;
pub mod nonce_set;
pub mod state;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use nonce_set::NonceSet;
pub use state::StateSnapshot;
pub use store::Store;
