//! The signed agent card published at `/.well-known/beacon.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_core::ids::AgentId;
use beacon_crypto::identity::verify as verify_signature;
use beacon_crypto::Identity;

use crate::error::CodecResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub beacon_version: String,
    pub agent_id: String,
    pub public_key_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub transports: Value,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub values: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AgentCard {
    pub fn new(beacon_version: impl Into<String>, identity: &Identity) -> Self {
        Self {
            beacon_version: beacon_version.into(),
            agent_id: identity.agent_id().to_string(),
            public_key_hex: identity.public_key_hex(),
            name: None,
            transports: Value::Object(Default::default()),
            capabilities: Value::Object(Default::default()),
            values: Value::Object(Default::default()),
            signature: None,
        }
    }

    /// Sign the card (minus `signature`) over its canonical JSON.
    pub fn sign(&mut self, identity: &Identity) -> CodecResult<()> {
        self.signature = None;
        let bytes = beacon_core::canonical::to_canonical_bytes(&self)?;
        self.signature = Some(identity.sign_hex(&bytes));
        Ok(())
    }

    /// Checks the signature and that `agent_id` actually derives from
    /// `public_key_hex`.
    pub fn verify(&self) -> bool {
        let Some(sig) = &self.signature else {
            return false;
        };
        let Ok(pubkey_bytes) = hex::decode(&self.public_key_hex) else {
            return false;
        };
        let Ok(pubkey_arr) = <[u8; 32]>::try_from(pubkey_bytes.as_slice()) else {
            return false;
        };
        let derived = AgentId::from_public_key(&pubkey_arr);
        if derived.as_str() != self.agent_id {
            return false;
        }

        let mut unsigned = self.clone();
        unsigned.signature = None;
        let Ok(bytes) = beacon_core::canonical::to_canonical_bytes(&unsigned) else {
            return false;
        };
        verify_signature(&self.public_key_hex, sig, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_card_verifies() {
        let identity = Identity::generate(false).unwrap();
        let mut card = AgentCard::new("1.0.0", &identity);
        card.name = Some("test-agent".to_string());
        card.sign(&identity).unwrap();
        assert!(card.verify());
    }

    #[test]
    fn tampered_card_fails_verification() {
        let identity = Identity::generate(false).unwrap();
        let mut card = AgentCard::new("1.0.0", &identity);
        card.sign(&identity).unwrap();
        card.name = Some("attacker-renamed".to_string());
        assert!(!card.verify());
    }

    #[test]
    fn mismatched_agent_id_fails_verification() {
        let identity = Identity::generate(false).unwrap();
        let mut card = AgentCard::new("1.0.0", &identity);
        card.sign(&identity).unwrap();
        card.agent_id = "bcn_000000000000".to_string();
        assert!(!card.verify());
    }
}
