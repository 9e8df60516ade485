//! A private, append-only log of an agent's own reflections. Never
//! transmitted; read only by the owning agent and its own analytics
//! (memory/insights).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

const JOURNAL_LOG: &str = "journal.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: i64,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default)]
    pub refs: serde_json::Map<String, Value>,
}

pub struct Journal {
    store: Store,
}

impl Journal {
    pub fn open(store: Store) -> Self {
        Self { store }
    }

    pub fn write(
        &self,
        text: &str,
        tags: Vec<String>,
        mood: Option<String>,
        refs: serde_json::Map<String, Value>,
    ) -> StorageResult<JournalEntry> {
        let entry = JournalEntry {
            ts: now_s(),
            text: text.to_string(),
            tags,
            mood,
            refs,
        };
        self.store.append(JOURNAL_LOG, &entry)?;
        Ok(entry)
    }

    pub fn all(&self) -> StorageResult<Vec<JournalEntry>> {
        self.store.read_all(JOURNAL_LOG)
    }

    pub fn recent(&self, n: usize) -> StorageResult<Vec<JournalEntry>> {
        self.store.tail(JOURNAL_LOG, n)
    }

    pub fn by_tag(&self, tag: &str) -> StorageResult<Vec<JournalEntry>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.tags.iter().any(|t| t == tag))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_filter_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let journal = Journal::open(store);
        journal
            .write("shipped a crate", vec!["goal".to_string(), "achieved".to_string()], None, Default::default())
            .unwrap();
        journal
            .write("quiet day", vec!["reflection".to_string()], Some("content".to_string()), Default::default())
            .unwrap();

        assert_eq!(journal.by_tag("goal").unwrap().len(), 1);
        assert_eq!(journal.all().unwrap().len(), 2);
    }
}
