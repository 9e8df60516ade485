//! Beacon Trust - per-peer interaction history and blocklist
//!
//! Trust is purely observational: nothing here enforces rate limits or
//! blocks envelopes itself. The rules engine and executor consult
//! `TrustStore` before acting.

pub mod blocklist;
pub mod interaction;
pub mod score;
pub mod trust;

pub use interaction::{Direction, Interaction, Outcome};
pub use score::TrustScore;
pub use trust::TrustStore;
