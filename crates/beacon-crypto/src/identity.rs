//! `Identity` ties a key pair to the agent id derived from it, and is the
//! one type the rest of Beacon constructs and signs through.

use beacon_core::ids::AgentId;

use crate::error::CryptoResult;
use crate::keys::{self, KeyPair};
use crate::keystore::{self, EncryptedKeystore};
use crate::mnemonic;

pub struct Identity {
    keypair: KeyPair,
    agent_id: AgentId,
    mnemonic: Option<String>,
}

impl Identity {
    fn from_keypair(keypair: KeyPair, mnemonic: Option<String>) -> Self {
        let agent_id = AgentId::from_public_key(&keypair.public_key_bytes());
        Self {
            keypair,
            agent_id,
            mnemonic,
        }
    }

    /// Create a fresh identity. When `with_mnemonic` is set the identity
    /// also carries a 24-word recovery phrase for `from_mnemonic` later.
    pub fn generate(with_mnemonic: bool) -> CryptoResult<Self> {
        if with_mnemonic {
            let (phrase, keypair) = mnemonic::generate()?;
            Ok(Self::from_keypair(keypair, Some(phrase)))
        } else {
            Ok(Self::from_keypair(KeyPair::generate(), None))
        }
    }

    pub fn from_private_key_hex(hex_str: &str) -> CryptoResult<Self> {
        let keypair = KeyPair::from_private_key_hex(hex_str)?;
        Ok(Self::from_keypair(keypair, None))
    }

    pub fn from_mnemonic(phrase: &str) -> CryptoResult<Self> {
        let keypair = mnemonic::from_phrase(phrase)?;
        Ok(Self::from_keypair(keypair, Some(phrase.to_string())))
    }

    pub fn from_encrypted(keystore: &EncryptedKeystore, password: &str) -> CryptoResult<Self> {
        let keypair = keystore::decrypt(keystore, password)?;
        Ok(Self::from_keypair(keypair, None))
    }

    pub fn to_encrypted(&self, password: &str) -> CryptoResult<EncryptedKeystore> {
        keystore::encrypt(&self.keypair, password)
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.keypair.signing_key_bytes())
    }

    /// Recovery phrase, if this identity was generated or loaded with one.
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }
}

/// Verify a signature against a raw public key. Re-exported here so callers
/// only need `beacon_crypto::identity` for the full sign/verify pair.
pub fn verify(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> bool {
    keys::verify(public_key_hex, signature_hex, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identity_signs_and_verifies() {
        let id = Identity::generate(false).unwrap();
        let msg = b"accord proposal";
        let sig = id.sign_hex(msg);
        assert!(verify(&id.public_key_hex(), &sig, msg));
    }

    #[test]
    fn agent_id_is_stable_across_reconstructions() {
        let id = Identity::generate(false).unwrap();
        let reconstructed = Identity::from_private_key_hex(&id.private_key_hex()).unwrap();
        assert_eq!(id.agent_id().as_str(), reconstructed.agent_id().as_str());
    }

    #[test]
    fn mnemonic_identity_recovers_same_agent_id() {
        let id = Identity::generate(true).unwrap();
        let phrase = id.mnemonic().unwrap().to_string();
        let recovered = Identity::from_mnemonic(&phrase).unwrap();
        assert_eq!(id.agent_id().as_str(), recovered.agent_id().as_str());
    }

    #[test]
    fn encrypted_roundtrip_preserves_identity() {
        let id = Identity::generate(false).unwrap();
        let ks = id.to_encrypted("hunter2").unwrap();
        let recovered = Identity::from_encrypted(&ks, "hunter2").unwrap();
        assert_eq!(id.agent_id().as_str(), recovered.agent_id().as_str());
    }
}
