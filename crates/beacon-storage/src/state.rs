//! `state.json`: monotonic per-key cursors plus the bounded read-nonce set.
//! Every component that needs "have I seen this before" durability reads
//! and writes through one shared snapshot rather than its own file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::nonce_set::NonceSet;
use crate::store::Store;
use crate::error::StorageResult;

const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub last_ts: HashMap<String, i64>,
    #[serde(default)]
    pub read_nonces: NonceSet,
}

impl StateSnapshot {
    pub fn load(store: &Store) -> StorageResult<Self> {
        store.load_snapshot_or_default(STATE_FILE)
    }

    pub fn save(&self, store: &Store) -> StorageResult<()> {
        store.snapshot(STATE_FILE, self)
    }

    /// Advance `key`'s cursor if `ts` is newer, returning whether it moved.
    pub fn advance(&mut self, key: &str, ts: i64) -> bool {
        let entry = self.last_ts.entry(key.to_string()).or_insert(i64::MIN);
        if ts > *entry {
            *entry = ts;
            true
        } else {
            false
        }
    }

    pub fn cursor(&self, key: &str) -> Option<i64> {
        self.last_ts.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_only_moves_forward() {
        let mut state = StateSnapshot::default();
        assert!(state.advance("inbox", 100));
        assert!(!state.advance("inbox", 50));
        assert!(state.advance("inbox", 150));
        assert_eq!(state.cursor("inbox"), Some(150));
    }

    #[test]
    fn persists_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut state = StateSnapshot::load(&store).unwrap();
        state.advance("inbox", 10);
        state.read_nonces.mark("n1");
        state.save(&store).unwrap();

        let reloaded = StateSnapshot::load(&store).unwrap();
        assert_eq!(reloaded.cursor("inbox"), Some(10));
        assert!(reloaded.read_nonces.contains("n1"));
    }
}
