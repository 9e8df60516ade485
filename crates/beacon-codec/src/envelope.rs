//! The wire record every transport carries. Beacon's envelopes are
//! dynamically typed by `kind`: rather than one variant per kind, an
//! envelope is a typed common header plus an open extension bag, so
//! unrecognized fields from a newer or foreign agent round-trip through
//! encode/decode unchanged instead of being dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use beacon_core::time::now_s;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub ts: i64,
    pub nonce: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ts: now_s(),
            nonce: nonce.into(),
            agent_id: None,
            pubkey: None,
            sig: None,
            extra: Map::new(),
        }
    }

    /// Builder-style insert into the extension bag, for constructing
    /// kind-specific payloads (`text`, `offers`, `reward`, `task_id`, ...).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.field_str("text")
    }

    pub fn task_id(&self) -> Option<&str> {
        self.field_str("task_id")
    }

    pub fn name(&self) -> Option<&str> {
        self.field_str("name")
    }

    pub fn topics(&self) -> Vec<String> {
        self.field("topics")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_signed(&self) -> bool {
        self.sig.is_some()
    }

    /// The bytes that are hashed and signed: this envelope, canonically
    /// serialized, with `sig` cleared.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut unsigned = self.clone();
        unsigned.sig = None;
        beacon_core::canonical::to_canonical_bytes(&unsigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_fields_round_trip_through_json() {
        let env = Envelope::new("bounty", "n1")
            .with_field("text", "build a thing")
            .with_field("reward_rtc", 12.5);
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text(), Some("build a thing"));
        assert_eq!(back.field("reward_rtc").and_then(Value::as_f64), Some(12.5));
    }

    #[test]
    fn signable_bytes_exclude_sig() {
        let mut env = Envelope::new("hello", "n2");
        env.sig = Some("deadbeef".to_string());
        let bytes = env.signable_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("deadbeef"));
    }
}
