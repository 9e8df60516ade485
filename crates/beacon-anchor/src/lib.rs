//! Beacon Anchor - commitment hashing and on-chain anchoring
//!
//! [`anchor::AnchorManager`] hashes arbitrary data into a commitment,
//! signs it, submits it to the ledger RPC via `beacon_transport::LedgerClient`,
//! and keeps a local audit log of every attempt regardless of outcome.

pub mod anchor;

pub use anchor::{
    action_anchor_payload, epoch_anchor_payload, AnchorError, AnchorLogEntry, AnchorLogStatus,
    AnchorManager, AnchorOutcome, AnchorResult,
};
