//! Beacon Crypto - agent identity, key management, and signatures
//!
//! An agent's identity is an Ed25519 key pair. The public half, hashed,
//! is the agent's id everywhere else in Beacon; the private half never
//! leaves this crate's types except as hex for storage or an encrypted
//! keystore.

pub mod error;
pub mod identity;
pub mod keys;
pub mod keystore;
pub mod mnemonic;

pub use error::{CryptoError, CryptoResult};
pub use identity::{verify, Identity};
pub use keys::KeyPair;
pub use keystore::EncryptedKeystore;
