//! Signed handshake over the wire format itself (framing + signature
//! verification + trust-on-first-use key learning), independent of any
//! particular transport. `beacon-transport`'s UDP/webhook tests reuse
//! this same `verify_envelope` contract once bytes are on a socket.

use std::collections::HashMap;

use beacon_codec::{decode_envelopes, encode, verify_envelope, Envelope};
use beacon_crypto::Identity;

#[test]
fn v2_envelope_round_trips_and_verifies_with_learned_key() {
    let alice = Identity::generate(false).unwrap();
    let hello = Envelope::new("hello", "n1");

    let framed = encode(hello, 2, Some(&alice), true).unwrap();
    assert!(framed.starts_with("[BEACON v2]"));
    assert!(framed.trim_end().ends_with("[/BEACON]"));

    let mut decoded = decode_envelopes(&framed);
    assert_eq!(decoded.len(), 1);
    let envelope = decoded.remove(0);
    assert_eq!(envelope.kind, "hello");
    assert_eq!(envelope.agent_id.as_deref(), Some(alice.agent_id().as_str()));

    // Bob has never seen Alice before: her embedded pubkey is learned
    // because it derives the very agent_id she claims.
    let mut known_keys: HashMap<String, String> = HashMap::new();
    assert_eq!(verify_envelope(&envelope, &mut known_keys), Some(true));
    assert_eq!(known_keys.get(alice.agent_id().as_str()), Some(&alice.public_key_hex()));
}

#[test]
fn tampered_payload_fails_verification() {
    let alice = Identity::generate(false).unwrap();
    let hello = Envelope::new("hello", "n2").with_field("text", "hi bob");
    let framed = encode(hello, 2, Some(&alice), true).unwrap();

    // Flip a character inside the payload text without touching the
    // signature: verification must fail, not silently pass.
    let tampered = framed.replace("hi bob", "hi eve");
    let mut decoded = decode_envelopes(&tampered);
    assert_eq!(decoded.len(), 1);
    let envelope = decoded.remove(0);

    let mut known_keys = HashMap::new();
    assert_eq!(verify_envelope(&envelope, &mut known_keys), Some(false));
}

#[test]
fn v1_envelope_is_unverifiable_not_rejected() {
    let hello = Envelope::new("hello", "n3");
    let framed = encode(hello, 1, None, false).unwrap();
    let mut decoded = decode_envelopes(&framed);
    let envelope = decoded.remove(0);

    let mut known_keys = HashMap::new();
    assert_eq!(verify_envelope(&envelope, &mut known_keys), None);
}

#[test]
fn unparseable_frame_is_skipped_not_fatal() {
    let text = "preamble\n[BEACON v2]\nnot json\n[/BEACON]\ntrailer";
    assert!(decode_envelopes(text).is_empty());
}
