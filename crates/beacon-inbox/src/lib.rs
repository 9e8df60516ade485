//! Beacon Inbox - inbound envelope ingestion
//!
//! The one place incoming envelopes land regardless of which transport
//! carried them: learn-on-first-use key discovery, signature
//! verification, nonce dedup bookkeeping, and filtered reads over the
//! persisted log.

pub mod inbox;

pub use inbox::{Inbox, InboxEntry, ReadFilter};
