//! Bounded read-once nonce tracking for envelope dedup. Capped so a
//! long-lived node's state file doesn't grow without bound; very old
//! nonces may eventually fall out and re-deliver.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

const MAX_NONCES: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct NonceSet {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl NonceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.seen.contains(nonce)
    }

    /// Marks a nonce read. No-op if already present.
    pub fn mark(&mut self, nonce: impl Into<String>) {
        let nonce = nonce.into();
        if !self.seen.insert(nonce.clone()) {
            return;
        }
        self.order.push_back(nonce);
        if self.order.len() > MAX_NONCES {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl From<Vec<String>> for NonceSet {
    fn from(order: Vec<String>) -> Self {
        let seen = order.iter().cloned().collect();
        Self {
            order: order.into(),
            seen,
        }
    }
}

impl From<NonceSet> for Vec<String> {
    fn from(set: NonceSet) -> Self {
        set.order.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_contains() {
        let mut set = NonceSet::new();
        assert!(!set.contains("n1"));
        set.mark("n1");
        assert!(set.contains("n1"));
    }

    #[test]
    fn eviction_caps_at_max_entries() {
        let mut set = NonceSet::new();
        for i in 0..MAX_NONCES + 10 {
            set.mark(format!("n{i}"));
        }
        assert_eq!(set.len(), MAX_NONCES);
        assert!(!set.contains("n0"));
        assert!(set.contains(&format!("n{}", MAX_NONCES + 9)));
    }

    #[test]
    fn round_trips_through_json() {
        let mut set = NonceSet::new();
        set.mark("a");
        set.mark("b");
        let json = serde_json::to_string(&set).unwrap();
        let back: NonceSet = serde_json::from_str(&json).unwrap();
        assert!(back.contains("a"));
        assert!(back.contains("b"));
    }
}
