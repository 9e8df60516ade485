//! Beacon Transport - UDP, webhook, and ledger RPC carriers for envelopes
//!
//! Nothing in this crate persists anything. It moves bytes and, for the
//! webhook server, hands parsed envelopes to whatever [`webhook::InboundSink`]
//! the caller wires up (`beacon-inbox`'s `Inbox` in production).

pub mod error;
pub mod ledger;
pub mod udp;
pub mod webhook;

pub use error::{TransportError, TransportResult};
pub use ledger::LedgerClient;
pub use udp::UdpMessage;
pub use webhook::{InboundSink, IngestResult, WebhookServer};
