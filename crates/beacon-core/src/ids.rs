//! Opaque, prefixed IDs generated from cryptographic randomness.
//!
//! Every stored collection in Beacon keys its records by one of these,
//! so a reader can tell at a glance what a bare ID string refers to.

use rand_ids::random_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

mod rand_ids {
    use rand::RngCore;

    pub fn random_hex(n_bytes: usize) -> String {
        let mut buf = vec![0u8; n_bytes];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

pub use rand_ids::random_hex;

macro_rules! prefixed_id {
    ($name:ident, $prefix:expr, $bytes:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, random_hex($bytes)))
            }

            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

prefixed_id!(TaskId, "task_", 6);
prefixed_id!(AccordId, "acc_", 6);
prefixed_id!(ContractId, "ctr_", 6);
prefixed_id!(ActionId, "act_", 6);
prefixed_id!(GoalId, "goal_", 6);
prefixed_id!(AnchorLocalId, "anc_", 6);

/// `agent_id`: not randomly generated — always derived as
/// `"bcn_" + SHA-256(public_key)[0:12].hex()`. Kept as a newtype so it is
/// not confused with the other opaque IDs above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = crate::canonical::sha256(public_key);
        Self(format!("bcn_{}", hex::encode(&digest[..6])))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic conversation ID: both endpoints compute the same value
/// regardless of which one initiated, by sorting the pair first.
pub fn conversation_id(a: &str, b: &str, topic: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let payload = format!("{}|{}|{}", lo, hi, topic);
    let digest = crate::canonical::sha256(payload.as_bytes());
    format!("conv_{}", hex::encode(&digest[..5]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_symmetric() {
        assert_eq!(
            conversation_id("alice", "bob", "bounty"),
            conversation_id("bob", "alice", "bounty")
        );
    }

    #[test]
    fn conversation_id_depends_on_topic() {
        assert_ne!(
            conversation_id("alice", "bob", "bounty"),
            conversation_id("alice", "bob", "chat")
        );
    }

    #[test]
    fn ids_carry_their_prefix() {
        assert!(TaskId::new().as_str().starts_with("task_"));
        assert!(AccordId::new().as_str().starts_with("acc_"));
    }
}
