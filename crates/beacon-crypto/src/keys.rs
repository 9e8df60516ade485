//! Ed25519 key pair wrapper.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{CryptoError, CryptoResult};

/// An Ed25519 key pair. The signing (private) half never leaves this
/// type except through `signing_key_bytes`, which exists only so the
/// identity layer can persist it to an encrypted keystore.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_private_key_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyFormat(
                "private key must be 32 bytes".to_string(),
            ));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&arr))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a signature against a raw public key. Returns `false` rather
/// than erroring on malformed input, so callers (inbox, card checks) can
/// treat "not verified" uniformly.
pub fn verify(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> bool {
    let Ok(pk_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(pk_arr) = <[u8; 32]>::try_from(pk_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_arr) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_arr);

    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let kp = KeyPair::generate();
        let msg = b"hello beacon";
        let sig = hex::encode(kp.sign(msg));
        assert!(verify(&kp.public_key_hex(), &sig, msg));
    }

    #[test]
    fn verify_fails_on_tampered_message() {
        let kp = KeyPair::generate();
        let sig = hex::encode(kp.sign(b"hello beacon"));
        assert!(!verify(&kp.public_key_hex(), &sig, b"goodbye beacon"));
    }

    #[test]
    fn from_bytes_roundtrips_key_material() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::from_bytes(&kp1.signing_key_bytes());
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
    }
}
