//! Plain-text frame delimiters so an envelope can be embedded in any text
//! medium (UDP datagram, webhook body, chat message, social post).

use std::collections::HashMap;

use beacon_core::ids::AgentId;
use beacon_crypto::identity::verify as verify_signature;
use beacon_crypto::Identity;

use crate::envelope::Envelope;
use crate::error::{CodecError, CodecResult};

const OPEN_PREFIX: &str = "[BEACON v";
const CLOSE_TAG: &str = "[/BEACON]";

/// Sign (if v2 and an identity is given) and frame an envelope as text.
pub fn encode(
    mut envelope: Envelope,
    version: u8,
    identity: Option<&Identity>,
    include_pubkey: bool,
) -> CodecResult<String> {
    if version >= 2 {
        let identity = identity.ok_or(CodecError::MissingIdentity)?;
        envelope.agent_id = Some(identity.agent_id().to_string());
        envelope.pubkey = if include_pubkey {
            Some(identity.public_key_hex())
        } else {
            None
        };
        envelope.sig = None;
        let bytes = envelope.signable_bytes()?;
        envelope.sig = Some(identity.sign_hex(&bytes));
    }

    let json = serde_json::to_string(&envelope)?;
    Ok(format!("[BEACON v{}]\n{}\n{}", version, json, CLOSE_TAG))
}

/// Scan free-form text for `[BEACON vN]...[/BEACON]` frames and parse each
/// as an envelope. Frames that fail to parse as JSON are skipped rather
/// than aborting the whole scan.
pub fn decode_envelopes(text: &str) -> Vec<Envelope> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while let Some(rel_start) = text[cursor..].find(OPEN_PREFIX) {
        let open_start = cursor + rel_start;
        let Some(rel_header_end) = text[open_start..].find(']') else {
            break;
        };
        let body_start = open_start + rel_header_end + 1;

        let Some(rel_close) = text[body_start..].find(CLOSE_TAG) else {
            break;
        };
        let body_end = body_start + rel_close;
        let body = text[body_start..body_end].trim();

        if let Ok(env) = serde_json::from_str::<Envelope>(body) {
            out.push(env);
        }

        cursor = body_end + CLOSE_TAG.len();
    }

    out
}

/// `None` for an unsigned (v1) envelope; `Some(true/false)` for v2.
/// `known_keys` is a trust-on-first-use map of `agent_id -> public_key_hex`,
/// updated in place when a new agent's embedded pubkey checks out.
pub fn verify_envelope(env: &Envelope, known_keys: &mut HashMap<String, String>) -> Option<bool> {
    let sig_hex = env.sig.as_ref()?;

    let embedded = env.pubkey.as_ref();
    let learned = env
        .agent_id
        .as_ref()
        .and_then(|id| known_keys.get(id))
        .cloned();
    let Some(pubkey_hex) = embedded.cloned().or(learned) else {
        return Some(false);
    };

    let Ok(pubkey_bytes) = hex::decode(&pubkey_hex) else {
        return Some(false);
    };
    let Ok(pubkey_arr) = <[u8; 32]>::try_from(pubkey_bytes.as_slice()) else {
        return Some(false);
    };
    let derived_agent_id = AgentId::from_public_key(&pubkey_arr);
    if env.agent_id.as_deref() != Some(derived_agent_id.as_str()) {
        return Some(false);
    }

    let Ok(bytes) = env.signable_bytes() else {
        return Some(false);
    };
    let valid = verify_signature(&pubkey_hex, sig_hex, &bytes);

    if valid {
        if let (Some(agent_id), Some(pk)) = (&env.agent_id, embedded) {
            known_keys.entry(agent_id.clone()).or_insert_with(|| pk.clone());
        }
    }

    Some(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_preserves_payload() {
        let identity = Identity::generate(false).unwrap();
        let env = Envelope::new("hello", "n1").with_field("text", "hi");
        let framed = encode(env, 2, Some(&identity), true).unwrap();

        let decoded = decode_envelopes(&framed);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].text(), Some("hi"));

        let mut known = HashMap::new();
        assert_eq!(verify_envelope(&decoded[0], &mut known), Some(true));
    }

    #[test]
    fn v1_envelope_is_unsigned() {
        let env = Envelope::new("hello", "n2");
        let framed = encode(env, 1, None, false).unwrap();
        let decoded = decode_envelopes(&framed);
        let mut known = HashMap::new();
        assert_eq!(verify_envelope(&decoded[0], &mut known), None);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let identity = Identity::generate(false).unwrap();
        let env = Envelope::new("hello", "n3").with_field("text", "original");
        let framed = encode(env, 2, Some(&identity), true).unwrap();
        let tampered = framed.replace("original", "tampered!");
        let decoded = decode_envelopes(&tampered);
        let mut known = HashMap::new();
        assert_eq!(verify_envelope(&decoded[0], &mut known), Some(false));
    }

    #[test]
    fn learn_on_first_use_populates_known_keys() {
        let identity = Identity::generate(false).unwrap();
        let env = Envelope::new("hello", "n4");
        let framed = encode(env, 2, Some(&identity), true).unwrap();
        let decoded = decode_envelopes(&framed);

        let mut known = HashMap::new();
        assert!(!known.contains_key(identity.agent_id().as_str()));
        verify_envelope(&decoded[0], &mut known);
        assert_eq!(
            known.get(identity.agent_id().as_str()),
            Some(&identity.public_key_hex())
        );
    }

    #[test]
    fn unparseable_frame_is_skipped_not_fatal() {
        let text = "[BEACON v2]\nnot json\n[/BEACON]\n[BEACON v1]\n{\"kind\":\"hello\",\"ts\":1,\"nonce\":\"x\"}\n[/BEACON]";
        let decoded = decode_envelopes(text);
        assert_eq!(decoded.len(), 1);
    }
}
