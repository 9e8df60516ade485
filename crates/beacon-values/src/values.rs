//! Principles, boundaries, and aesthetics: an agent's stance, independent
//! of what it can do.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_codec::Envelope;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

use crate::error::{ValuesError, ValuesResult};

const VALUES_FILE: &str = "values.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principle {
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuesDoc {
    #[serde(default)]
    pub principles: HashMap<String, Principle>,
    #[serde(default)]
    pub boundaries: Vec<String>,
    #[serde(default)]
    pub aesthetics: HashMap<String, Value>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_version() -> u32 {
    1
}

impl ValuesDoc {
    pub fn load(store: &Store) -> StorageResult<Self> {
        store.load_snapshot_or_default(VALUES_FILE)
    }

    fn save(&mut self, store: &Store) -> StorageResult<()> {
        self.updated_at = now_s();
        self.version += 1;
        store.snapshot(VALUES_FILE, self)
    }

    pub fn set_principle(
        &mut self,
        store: &Store,
        name: &str,
        weight: f64,
        text: Option<String>,
    ) -> ValuesResult<()> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(ValuesError::EmptyPrincipleName);
        }
        self.principles.insert(
            name,
            Principle {
                weight: weight.clamp(0.0, 1.0),
                text,
            },
        );
        self.save(store)?;
        Ok(())
    }

    pub fn remove_principle(&mut self, store: &Store, name: &str) -> StorageResult<bool> {
        let removed = self.principles.remove(&name.trim().to_lowercase()).is_some();
        if removed {
            self.save(store)?;
        }
        Ok(removed)
    }

    pub fn add_boundary(&mut self, store: &Store, text: &str) -> ValuesResult<usize> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ValuesError::EmptyBoundaryText);
        }
        self.boundaries.push(text);
        self.save(store)?;
        Ok(self.boundaries.len() - 1)
    }

    pub fn remove_boundary(&mut self, store: &Store, idx: usize) -> StorageResult<bool> {
        if idx < self.boundaries.len() {
            self.boundaries.remove(idx);
            self.save(store)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn set_aesthetic(
        &mut self,
        store: &Store,
        key: &str,
        value: Value,
    ) -> StorageResult<()> {
        self.aesthetics.insert(key.trim().to_lowercase(), value);
        self.save(store)
    }

    /// First 16 hex chars of the SHA-256 over canonical `{principles,
    /// boundaries, aesthetics}`. Included in pulses so peers can detect
    /// values drift without fetching the whole document.
    pub fn values_hash(&self) -> String {
        let subset = serde_json::json!({
            "principles": self.principles,
            "boundaries": self.boundaries,
            "aesthetics": self.aesthetics,
        });
        let bytes = beacon_core::canonical::canonical_value_bytes(subset);
        beacon_core::canonical::sha256_hex(&bytes)[..16].to_string()
    }

    /// Compatibility with another agent's values, in `[0, 1]`.
    pub fn compatibility(&self, other: &ValuesDoc) -> f64 {
        if self.principles.is_empty() && other.principles.is_empty() {
            return 0.5;
        }

        let mut names: Vec<&String> = self.principles.keys().chain(other.principles.keys()).collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return 0.5;
        }

        let mut sum = 0.0;
        for name in &names {
            let mine = self.principles.get(*name);
            let theirs = other.principles.get(*name);
            match (mine, theirs) {
                (Some(a), Some(b)) => sum += 1.0 - (a.weight - b.weight).abs(),
                (Some(a), None) => sum += 0.3 * (1.0 - a.weight),
                (None, Some(b)) => sum += 0.3 * (1.0 - b.weight),
                (None, None) => {}
            }
        }

        (sum / names.len() as f64 * 1000.0).round() / 1000.0
    }

    /// The boundary violated by `envelope`, if any: every keyword (token
    /// longer than 3 chars) of the boundary must appear in the envelope's
    /// text/topics/offers/needs/kind blob.
    pub fn check_boundaries(&self, envelope: &Envelope) -> Option<&str> {
        if self.boundaries.is_empty() {
            return None;
        }

        let mut blob = String::new();
        blob.push_str(envelope.text().unwrap_or(""));
        blob.push(' ');
        blob.push_str(&envelope.topics().join(" "));
        blob.push(' ');
        if let Some(offers) = envelope.field("offers").and_then(Value::as_array) {
            blob.push_str(
                &offers
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        blob.push(' ');
        if let Some(needs) = envelope.field("needs").and_then(Value::as_array) {
            blob.push_str(
                &needs
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        blob.push(' ');
        blob.push_str(&envelope.kind);
        let blob = blob.to_lowercase();

        self.boundaries.iter().find(|boundary| {
            let keywords: Vec<&str> = boundary.split_whitespace().filter(|w| w.len() > 3).collect();
            !keywords.is_empty() && keywords.iter().all(|kw| blob.contains(&kw.to_lowercase()))
        }).map(|s| s.as_str())
    }

    pub fn to_card_summary(&self) -> Value {
        serde_json::json!({
            "principles": self.principles.keys().collect::<Vec<_>>(),
            "boundary_count": self.boundaries.len(),
            "aesthetics": self.aesthetics,
            "values_hash": self.values_hash(),
            "version": self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_hash_changes_with_content() {
        let mut doc = ValuesDoc::default();
        let empty_hash = doc.values_hash();
        doc.boundaries.push("no surveillance".to_string());
        assert_ne!(empty_hash, doc.values_hash());
    }

    #[test]
    fn empty_compatibility_is_neutral() {
        let a = ValuesDoc::default();
        let b = ValuesDoc::default();
        assert_eq!(a.compatibility(&b), 0.5);
    }

    #[test]
    fn identical_weights_score_full_compatibility() {
        let mut a = ValuesDoc::default();
        a.principles.insert(
            "honesty".to_string(),
            Principle {
                weight: 0.9,
                text: None,
            },
        );
        let b = a.clone();
        assert_eq!(a.compatibility(&b), 1.0);
    }

    #[test]
    fn boundary_requires_all_keywords_present() {
        let mut doc = ValuesDoc::default();
        doc.boundaries.push("no surveillance work".to_string());
        let matching = Envelope::new("bounty", "n1")
            .with_field("text", "Build a surveillance tool for monitoring");
        assert_eq!(doc.check_boundaries(&matching), Some("no surveillance work"));

        let benign = Envelope::new("bounty", "n2").with_field("text", "Build a website");
        assert_eq!(doc.check_boundaries(&benign), None);
    }

    #[test]
    fn empty_principle_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut doc = ValuesDoc::default();
        let err = doc.set_principle(&store, "   ", 0.5, None).unwrap_err();
        assert!(matches!(err, ValuesError::EmptyPrincipleName));
        assert!(doc.principles.is_empty());
    }

    #[test]
    fn empty_boundary_text_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut doc = ValuesDoc::default();
        let err = doc.add_boundary(&store, "  ").unwrap_err();
        assert!(matches!(err, ValuesError::EmptyBoundaryText));
        assert!(doc.boundaries.is_empty());
    }
}
