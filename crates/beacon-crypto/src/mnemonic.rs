//! BIP-39 mnemonic backing for identities that want a human-copyable
//! recovery phrase instead of a bare hex private key.

use bip39::Mnemonic;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::KeyPair;

const WORD_COUNT: usize = 24;

/// Generate a fresh 24-word mnemonic and the key pair it derives.
pub fn generate() -> CryptoResult<(String, KeyPair)> {
    let mnemonic = Mnemonic::generate(WORD_COUNT)
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
    let phrase = mnemonic.to_string();
    let keypair = keypair_from_mnemonic(&mnemonic);
    Ok((phrase, keypair))
}

/// Parse a mnemonic phrase and derive its key pair.
pub fn from_phrase(phrase: &str) -> CryptoResult<KeyPair> {
    let mnemonic: Mnemonic = phrase
        .parse()
        .map_err(|e: bip39::Error| CryptoError::InvalidMnemonic(e.to_string()))?;
    Ok(keypair_from_mnemonic(&mnemonic))
}

fn keypair_from_mnemonic(mnemonic: &Mnemonic) -> KeyPair {
    let seed = mnemonic.to_seed("");
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&seed[..32]);
    KeyPair::from_bytes(&sk_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_roundtrips_to_same_key() {
        let (phrase, kp1) = generate().unwrap();
        let kp2 = from_phrase(&phrase).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
    }

    #[test]
    fn malformed_phrase_is_rejected() {
        assert!(from_phrase("not a real mnemonic phrase at all").is_err());
    }
}
