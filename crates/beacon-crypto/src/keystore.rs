//! Password-encrypted keystore: scrypt-derived key, ChaCha20-Poly1305 AEAD
//! over the raw private key bytes.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};

use beacon_core::ids::AgentId;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::KeyPair;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // log_n=15 (N=32768) is scrypt's "interactive" tuning, matching
        // typical CLI-keystore defaults rather than the much heavier
        // "sensitive" preset.
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeystore {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    pub kdf_params: KdfParams,
    pub encrypted: bool,
    pub agent_id: String,
    pub public_key_hex: String,
}

fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<[u8; 32]> {
    let scrypt_params = ScryptParams::new(params.log_n, params.r, params.p, 32)
        .map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;
    let mut output = [0u8; 32];
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, &mut output)
        .map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;
    Ok(output)
}

/// Encrypt a key pair's private key under a password.
pub fn encrypt(keypair: &KeyPair, password: &str) -> CryptoResult<EncryptedKeystore> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let params = KdfParams::default();
    let key_bytes = derive_key(password, &salt, &params)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, keypair.signing_key_bytes().as_slice())
        .map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;

    let agent_id = AgentId::from_public_key(&keypair.public_key_bytes());

    Ok(EncryptedKeystore {
        salt: hex::encode(salt),
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(ciphertext),
        kdf_params: params,
        encrypted: true,
        agent_id: agent_id.to_string(),
        public_key_hex: keypair.public_key_hex(),
    })
}

/// Decrypt a keystore with a password. Fails with `InvalidKeystore` on a
/// wrong password or tampered ciphertext — AEAD verification catches both.
pub fn decrypt(keystore: &EncryptedKeystore, password: &str) -> CryptoResult<KeyPair> {
    let salt =
        hex::decode(&keystore.salt).map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;
    let nonce_bytes =
        hex::decode(&keystore.nonce).map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;
    let ciphertext = hex::decode(&keystore.ciphertext)
        .map_err(|e| CryptoError::InvalidKeystore(e.to_string()))?;

    let key_bytes = derive_key(password, &salt, &keystore.kdf_params)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| CryptoError::InvalidKeystore("wrong password or tampered data".to_string()))?;

    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKeystore(
            "decrypted key has unexpected length".to_string(),
        ));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&plaintext);
    Ok(KeyPair::from_bytes(&arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_identity() {
        let kp = KeyPair::generate();
        let ks = encrypt(&kp, "correct horse battery staple").unwrap();
        let recovered = decrypt(&ks, "correct horse battery staple").unwrap();
        assert_eq!(kp.public_key_hex(), recovered.public_key_hex());
    }

    #[test]
    fn wrong_password_fails_closed() {
        let kp = KeyPair::generate();
        let ks = encrypt(&kp, "right password").unwrap();
        assert!(decrypt(&ks, "wrong password").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let kp = KeyPair::generate();
        let mut ks = encrypt(&kp, "pw").unwrap();
        let mut bytes = hex::decode(&ks.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        ks.ciphertext = hex::encode(bytes);
        assert!(decrypt(&ks, "pw").is_err());
    }
}
