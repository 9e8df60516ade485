//! The persistent outbound queue: one append-only log for the full
//! audit trail, one snapshot for the live pending index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_codec::Envelope;
use beacon_core::ids::random_hex;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

const OUTBOX_LOG: &str = "outbox.jsonl";
const OUTBOX_PENDING: &str = "outbox_pending.json";
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxItem {
    pub action_id: String,
    pub action_type: String,
    pub target_agent_id: String,
    pub envelope: Envelope,
    pub transport_hint: String,
    pub status: OutboxStatus,
    pub source: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub attempts: u32,
    pub error: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct LogEvent<'a> {
    action_id: &'a str,
    status: OutboxStatus,
    #[serde(skip_serializing_if = "str::is_empty")]
    error: &'a str,
    ts: i64,
}

pub struct OutboxManager {
    store: Store,
    pending: HashMap<String, OutboxItem>,
}

impl OutboxManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let pending = store.load_snapshot_or_default(OUTBOX_PENDING)?;
        Ok(Self { store, pending })
    }

    fn save(&self) -> StorageResult<()> {
        self.store.snapshot(OUTBOX_PENDING, &self.pending)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn queue(
        &mut self,
        action_type: impl Into<String>,
        target_agent_id: impl Into<String>,
        envelope: Envelope,
        transport_hint: impl Into<String>,
        source: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> StorageResult<String> {
        let now = now_s();
        let action_id = random_hex(6);
        let item = OutboxItem {
            action_id: action_id.clone(),
            action_type: action_type.into(),
            target_agent_id: target_agent_id.into(),
            envelope,
            transport_hint: transport_hint.into(),
            status: OutboxStatus::Pending,
            source: source.into(),
            created_at: now,
            updated_at: now,
            attempts: 0,
            error: String::new(),
            conversation_id: conversation_id.into(),
        };
        self.store.append(OUTBOX_LOG, &item)?;
        self.pending.insert(action_id.clone(), item);
        self.save()?;
        Ok(action_id)
    }

    /// Items ready to send: `pending` status, under the retry cap,
    /// oldest first.
    pub fn pending(&self, limit: usize) -> Vec<OutboxItem> {
        let mut items: Vec<OutboxItem> = self
            .pending
            .values()
            .filter(|i| i.status == OutboxStatus::Pending && i.attempts < MAX_RETRY_ATTEMPTS)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        items.truncate(limit);
        items
    }

    pub fn mark_sent(&mut self, action_id: &str) -> StorageResult<()> {
        self.update_status(action_id, OutboxStatus::Sent, "")
    }

    pub fn mark_delivered(&mut self, action_id: &str) -> StorageResult<()> {
        self.update_status(action_id, OutboxStatus::Delivered, "")
    }

    pub fn mark_failed(&mut self, action_id: &str, error: &str) -> StorageResult<()> {
        if let Some(item) = self.pending.get_mut(action_id) {
            item.status = OutboxStatus::Failed;
            item.updated_at = now_s();
            if !error.is_empty() {
                item.error = error.to_string();
            }
            self.save()?;
            self.store.append(OUTBOX_LOG, &LogEvent { action_id, status: OutboxStatus::Failed, error, ts: now_s() })?;
        }
        Ok(())
    }

    /// Increment the attempt counter; auto-fails the item once it
    /// reaches `MAX_RETRY_ATTEMPTS`.
    pub fn mark_retry(&mut self, action_id: &str) -> StorageResult<()> {
        if let Some(item) = self.pending.get_mut(action_id) {
            item.attempts += 1;
            item.updated_at = now_s();
            if item.attempts >= MAX_RETRY_ATTEMPTS {
                item.status = OutboxStatus::Failed;
                item.error = "max_retries_exceeded".to_string();
            }
            self.save()?;
        }
        Ok(())
    }

    pub fn get(&self, action_id: &str) -> Option<&OutboxItem> {
        self.pending.get(action_id)
    }

    pub fn recent(&self, limit: usize) -> StorageResult<Vec<serde_json::Value>> {
        let mut all: Vec<serde_json::Value> = self.store.read_all(OUTBOX_LOG)?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    pub fn count_pending(&self) -> usize {
        self.pending(usize::MAX).len()
    }

    /// Drop completed/failed items older than `max_age_days` from the
    /// pending index. The log itself is never trimmed.
    pub fn cleanup(&mut self, max_age_days: i64) -> StorageResult<usize> {
        let cutoff = now_s() - max_age_days * 86_400;
        let to_remove: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, i)| matches!(i.status, OutboxStatus::Sent | OutboxStatus::Delivered | OutboxStatus::Failed) && i.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &to_remove {
            self.pending.remove(id);
        }
        if !to_remove.is_empty() {
            self.save()?;
        }
        Ok(to_remove.len())
    }

    fn update_status(&mut self, action_id: &str, status: OutboxStatus, error: &str) -> StorageResult<()> {
        if let Some(item) = self.pending.get_mut(action_id) {
            item.status = status;
            item.updated_at = now_s();
            self.save()?;
            self.store.append(OUTBOX_LOG, &LogEvent { action_id, status, error, ts: now_s() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, OutboxManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, OutboxManager::open(store).unwrap())
    }

    #[test]
    fn queue_then_pending_round_trips() {
        let (_dir, mut mgr) = open();
        let env = Envelope::new("hello", "n1");
        let id = mgr.queue("reply", "bcn_peer", env, "", "rule:x", "").unwrap();
        let pending = mgr.pending(10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_id, id);
    }

    #[test]
    fn retry_auto_fails_after_max_attempts() {
        let (_dir, mut mgr) = open();
        let id = mgr.queue("emit", "bcn_peer", Envelope::new("x", "n2"), "", "", "").unwrap();
        for _ in 0..MAX_RETRY_ATTEMPTS {
            mgr.mark_retry(&id).unwrap();
        }
        assert_eq!(mgr.get(&id).unwrap().status, OutboxStatus::Failed);
        assert!(mgr.pending(10).is_empty());
    }

    #[test]
    fn cleanup_removes_old_terminal_items_only() {
        let (_dir, mut mgr) = open();
        let id = mgr.queue("emit", "bcn_peer", Envelope::new("x", "n3"), "", "", "").unwrap();
        mgr.mark_sent(&id).unwrap();
        mgr.pending.get_mut(&id).unwrap().updated_at = now_s() - 10 * 86_400;
        let removed = mgr.cleanup(7).unwrap();
        assert_eq!(removed, 1);
        assert!(mgr.get(&id).is_none());
    }
}
