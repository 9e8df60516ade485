use std::collections::HashMap;

use beacon_storage::{Store, StorageResult};

const BLOCKED_FILE: &str = "blocked.json";

pub fn load(store: &Store) -> StorageResult<HashMap<String, String>> {
    store.load_snapshot_or_default(BLOCKED_FILE)
}

pub fn save(store: &Store, blocked: &HashMap<String, String>) -> StorageResult<()> {
    store.snapshot(BLOCKED_FILE, blocked)
}
