//! Beacon Codec - envelope framing and canonical signing
//!
//! Envelopes are dynamically typed by `kind`; this crate represents them
//! as a typed header plus an open extension bag (see `envelope::Envelope`)
//! so unknown fields round-trip unchanged instead of being dropped by a
//! fixed variant set.

pub mod card;
pub mod envelope;
pub mod error;
pub mod framing;

pub use card::AgentCard;
pub use envelope::Envelope;
pub use error::{CodecError, CodecResult};
pub use framing::{decode_envelopes, encode, verify_envelope};
